//! Vehicle telemetry service boundary
//!
//! Client sessions only ever see a [`VehicleHandle`]. The MAVLink adapter in
//! `crate::autopilot` is the production implementation.

#[cfg(test)]
pub mod scripted;
mod traits;

pub use traits::{Action, Battery, Position, TelemetryFeed, VehicleError, VehicleHandle, VehicleService};
