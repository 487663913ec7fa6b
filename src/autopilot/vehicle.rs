//! MAVLink-backed vehicle telemetry service

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use mavlink::ardupilotmega::{MavMessage, MavType};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::commands::MavCommandSender;
use super::connection::{FcConfig, FlightController};
use super::telemetry;
use crate::vehicle::{Action, Battery, Position, TelemetryFeed, VehicleError, VehicleService};

/// The one vehicle this relay serves, reached over MAVLink
pub struct MavlinkVehicle {
    fc: Arc<FlightController>,
    commands: MavCommandSender,
}

impl MavlinkVehicle {
    /// Open the link, start the GCS heartbeat and schedule the telemetry
    /// stream requests
    pub async fn connect(config: FcConfig) -> Result<Self, VehicleError> {
        let commands = MavCommandSender::new(config.target_system, config.target_component);
        let fc = Arc::new(FlightController::connect(config).await?);

        spawn_heartbeat(fc.clone(), commands.clone());
        spawn_stream_requests(fc.clone(), commands.clone());

        Ok(Self { fc, commands })
    }

    async fn act(&self, action: Action) -> Result<(), VehicleError> {
        let result = match action {
            Action::Arm => self.commands.arm(&self.fc).await,
            Action::Disarm => self.commands.disarm(&self.fc).await,
            Action::Kill => self.commands.kill(&self.fc).await,
        };
        result.map_err(|e| VehicleError::Action {
            action,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl VehicleService for MavlinkVehicle {
    async fn wait_for_position_fix(&self) -> Result<(), VehicleError> {
        let mut rx = self.fc.subscribe();
        let heartbeat_timeout = self.fc.config().heartbeat_timeout;

        tokio::time::timeout(
            heartbeat_timeout,
            wait_for(&mut rx, is_autopilot_heartbeat),
        )
        .await
        .map_err(|_| VehicleError::Timeout("autopilot heartbeat"))??;
        info!("[MAVLink] Autopilot heartbeat received");

        wait_for(&mut rx, telemetry::has_position_fix).await
    }

    fn position_feed(&self) -> TelemetryFeed<Position> {
        message_feed(self.fc.subscribe(), telemetry::position_from)
    }

    fn battery_feed(&self) -> TelemetryFeed<Battery> {
        message_feed(self.fc.subscribe(), telemetry::battery_from)
    }

    async fn arm(&self) -> Result<(), VehicleError> {
        self.act(Action::Arm).await
    }

    async fn disarm(&self) -> Result<(), VehicleError> {
        self.act(Action::Disarm).await
    }

    async fn kill(&self) -> Result<(), VehicleError> {
        self.act(Action::Kill).await
    }

    fn name(&self) -> &'static str {
        "MAVLink"
    }
}

/// Periodic GCS heartbeat; stops once the link is down
fn spawn_heartbeat(fc: Arc<FlightController>, commands: MavCommandSender) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(fc.config().gcs_heartbeat_interval);
        while fc.is_connected() {
            ticker.tick().await;
            if let Err(e) = fc.send(commands.heartbeat()).await {
                debug!("[MAVLink] Heartbeat send failed: {}", e);
            }
        }
        warn!("[MAVLink] Link down, heartbeat stopped");
    });
}

/// Request telemetry streams once the autopilot has been heard from
///
/// A listening UDP link has no peer address until the first packet arrives,
/// and sends before that are silently dropped.
fn spawn_stream_requests(fc: Arc<FlightController>, commands: MavCommandSender) {
    let mut rx = fc.subscribe();
    tokio::spawn(async move {
        if wait_for(&mut rx, is_autopilot_heartbeat).await.is_err() {
            return;
        }
        match commands.request_telemetry_streams(&fc).await {
            Ok(()) => info!("[MAVLink] Telemetry streams requested"),
            // The autopilot may already stream by default
            Err(e) => warn!("[MAVLink] Failed to request telemetry streams: {}", e),
        }
    });
}

fn is_autopilot_heartbeat(msg: &MavMessage) -> bool {
    matches!(msg, MavMessage::HEARTBEAT(hb) if hb.mavtype != MavType::MAV_TYPE_GCS)
}

/// Consume messages until one matches
async fn wait_for<F>(rx: &mut broadcast::Receiver<MavMessage>, matches: F) -> Result<(), VehicleError>
where
    F: Fn(&MavMessage) -> bool,
{
    loop {
        match rx.recv().await {
            Ok(msg) if matches(&msg) => return Ok(()),
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return Err(VehicleError::FeedClosed { feed: "link" }),
        }
    }
}

/// Turn a broadcast subscription into a stream of extracted samples
///
/// The stream ends when the link closes.
fn message_feed<T, F>(rx: broadcast::Receiver<MavMessage>, extract: F) -> TelemetryFeed<T>
where
    T: Send + 'static,
    F: Fn(&MavMessage) -> Option<T> + Send + 'static,
{
    stream::unfold((rx, extract), |(mut rx, extract)| async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if let Some(sample) = extract(&msg) {
                        return Some((sample, (rx, extract)));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("[MAVLink] Feed lagged, skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
