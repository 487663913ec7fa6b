//! MAVLink Telemetry Extraction
//!
//! Converts raw autopilot messages into the relay's telemetry samples, and
//! logs the link events worth seeing from the relay console.

use mavlink::ardupilotmega::MavMessage;
use tracing::{debug, error, info, warn};

use crate::vehicle::{Battery, Position};

/// `SYS_STATUS.voltage_battery` value meaning "not reported"
const VOLTAGE_UNKNOWN: u16 = u16::MAX;

/// Minimum `GPS_RAW_INT.fix_type` for a usable position (3D fix)
const MIN_FIX_TYPE: u8 = 3;

/// Position sample from `GLOBAL_POSITION_INT`
pub fn position_from(msg: &MavMessage) -> Option<Position> {
    match msg {
        MavMessage::GLOBAL_POSITION_INT(pos) => Some(Position {
            latitude_deg: pos.lat as f64 / 1e7,
            longitude_deg: pos.lon as f64 / 1e7,
            relative_altitude_m: pos.relative_alt as f32 / 1000.0, // mm to m
        }),
        _ => None,
    }
}

/// Battery sample from `SYS_STATUS`
pub fn battery_from(msg: &MavMessage) -> Option<Battery> {
    match msg {
        MavMessage::SYS_STATUS(sys) if sys.voltage_battery != VOLTAGE_UNKNOWN => Some(Battery {
            voltage_v: sys.voltage_battery as f32 / 1000.0, // mV to V
        }),
        _ => None,
    }
}

/// True once `GPS_RAW_INT` reports a 3D fix or better
pub fn has_position_fix(msg: &MavMessage) -> bool {
    match msg {
        MavMessage::GPS_RAW_INT(gps) => gps.fix_type as u8 >= MIN_FIX_TYPE,
        _ => false,
    }
}

/// Tracks link state across messages for logging
#[derive(Debug, Default)]
pub struct TelemetryMonitor {
    armed: Option<bool>,
    mode: Option<u32>,
}

impl TelemetryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log state changes and autopilot status text
    pub fn observe(&mut self, msg: &MavMessage) {
        match msg {
            MavMessage::HEARTBEAT(hb) => {
                let armed = (hb.base_mode.bits() & 0x80) != 0; // MAV_MODE_FLAG_SAFETY_ARMED
                if self.armed != Some(armed) {
                    info!("[FC] {}", if armed { "ARMED" } else { "DISARMED" });
                    self.armed = Some(armed);
                }
                if self.mode != Some(hb.custom_mode) {
                    info!("[FC] Mode: {}", mode_to_string(hb.custom_mode));
                    self.mode = Some(hb.custom_mode);
                }
            }

            MavMessage::STATUSTEXT(text) => {
                let text_str = String::from_utf8_lossy(&text.text).to_string();
                let text_str = text_str.trim_end_matches('\0');
                let severity = text.severity as u8;

                match severity {
                    0..=3 => error!("[FC] {}: {}", severity_to_string(severity), text_str),
                    4 => warn!("[FC] {}: {}", severity_to_string(severity), text_str),
                    5 | 6 => info!("[FC] {}: {}", severity_to_string(severity), text_str),
                    _ => debug!("[FC] {}: {}", severity_to_string(severity), text_str),
                }
            }

            _ => {
                // Other messages only feed subscriptions
            }
        }
    }

    pub fn is_armed(&self) -> Option<bool> {
        self.armed
    }
}

/// Convert ArduPilot Copter mode number to string
fn mode_to_string(mode: u32) -> String {
    match mode {
        0 => "STABILIZE".to_string(),
        2 => "ALT_HOLD".to_string(),
        3 => "AUTO".to_string(),
        4 => "GUIDED".to_string(),
        5 => "LOITER".to_string(),
        6 => "RTL".to_string(),
        9 => "LAND".to_string(),
        16 => "POSHOLD".to_string(),
        17 => "BRAKE".to_string(),
        21 => "SMART_RTL".to_string(),
        _ => format!("UNKNOWN({})", mode),
    }
}

/// Convert MAVLink severity to string
fn severity_to_string(severity: u8) -> &'static str {
    match severity {
        0 => "EMERGENCY",
        1 => "ALERT",
        2 => "CRITICAL",
        3 => "ERROR",
        4 => "WARNING",
        5 => "NOTICE",
        6 => "INFO",
        7 => "DEBUG",
        _ => "UNKNOWN",
    }
}
