//! MAVLink Command Translation
//!
//! Builds the `COMMAND_LONG` and heartbeat messages the relay sends to the
//! flight controller.

use anyhow::Result;
use mavlink::ardupilotmega::{
    MavAutopilot, MavCmd, MavMessage, MavModeFlag, MavState, MavType, COMMAND_LONG_DATA,
    HEARTBEAT_DATA,
};
use tracing::{debug, info, warn};

use super::connection::FlightController;

/// `MAV_CMD_COMPONENT_ARM_DISARM` param2 that forces a disarm in flight
const FORCE_DISARM_MAGIC: f32 = 21196.0;

/// Message IDs the relay needs streamed
pub const GLOBAL_POSITION_INT_ID: u32 = 33;
pub const SYS_STATUS_ID: u32 = 1;
pub const GPS_RAW_INT_ID: u32 = 24;

/// Sends commands to the flight controller via MAVLink
#[derive(Debug, Clone)]
pub struct MavCommandSender {
    target_system: u8,
    target_component: u8,
}

impl MavCommandSender {
    /// Create a new command sender
    pub fn new(target_system: u8, target_component: u8) -> Self {
        Self {
            target_system,
            target_component,
        }
    }

    /// Arm the drone
    pub async fn arm(&self, fc: &FlightController) -> Result<()> {
        info!("[MAVLink] Sending ARM command");
        fc.send(self.arm_disarm(1.0, 0.0)).await
    }

    /// Disarm the drone
    pub async fn disarm(&self, fc: &FlightController) -> Result<()> {
        info!("[MAVLink] Sending DISARM command");
        fc.send(self.arm_disarm(0.0, 0.0)).await
    }

    /// Kill motors immediately
    ///
    /// Forces a disarm even while flying. The drone will fall.
    pub async fn kill(&self, fc: &FlightController) -> Result<()> {
        warn!("[MAVLink] KILL - stopping motors!");
        fc.send(self.arm_disarm(0.0, FORCE_DISARM_MAGIC)).await
    }

    /// Ask the autopilot to stream a message at a fixed rate
    pub async fn request_message_interval(
        &self,
        fc: &FlightController,
        message_id: u32,
        interval_us: f32,
    ) -> Result<()> {
        debug!(
            "[MAVLink] Requesting message {} every {}us",
            message_id, interval_us
        );
        fc.send(self.command_long(
            MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
            [message_id as f32, interval_us, 0.0, 0.0, 0.0, 0.0, 0.0],
        ))
        .await
    }

    /// Request every stream the relay's feeds read from
    pub async fn request_telemetry_streams(&self, fc: &FlightController) -> Result<()> {
        for message_id in [GLOBAL_POSITION_INT_ID, SYS_STATUS_ID, GPS_RAW_INT_ID] {
            self.request_message_interval(fc, message_id, 200_000.0) // 5 Hz
                .await?;
        }
        Ok(())
    }

    /// Ground station heartbeat so the autopilot keeps us as a peer
    pub fn heartbeat(&self) -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GCS,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    fn arm_disarm(&self, arm: f32, force: f32) -> MavMessage {
        self.command_long(
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [arm, force, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }

    fn command_long(&self, command: MavCmd, params: [f32; 7]) -> MavMessage {
        MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        })
    }
}
