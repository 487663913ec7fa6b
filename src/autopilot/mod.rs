//! MAVLink Autopilot Adapter
//!
//! Implements the vehicle telemetry service on top of an ArduPilot/PX4
//! flight controller reached over serial, UDP or TCP.

mod commands;
mod connection;
mod telemetry;
mod vehicle;

pub use connection::{FcConfig, FcConnectionType};
pub use vehicle::MavlinkVehicle;
