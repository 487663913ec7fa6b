//! Vehicle service trait for pluggable autopilot backends

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// One position sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    /// Altitude above the home position
    pub relative_altitude_m: f32,
}

/// One battery sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Battery {
    pub voltage_v: f32,
}

/// Fire-and-forget vehicle actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Arm,
    Disarm,
    Kill,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Arm => write!(f, "ARM"),
            Action::Disarm => write!(f, "DISARM"),
            Action::Kill => write!(f, "KILL"),
        }
    }
}

/// Errors raised by the vehicle telemetry service
#[derive(Error, Debug)]
pub enum VehicleError {
    #[error("Vehicle connection failed: {0}")]
    Connect(String),

    #[error("Invalid vehicle address: {0}")]
    InvalidAddress(String),

    #[error("{action} action failed: {reason}")]
    Action { action: Action, reason: String },

    #[error("{feed} feed ended before producing a value")]
    FeedClosed { feed: &'static str },

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

/// A live telemetry stream; sampling takes its next item
pub type TelemetryFeed<T> = BoxStream<'static, T>;

/// The telemetry and control surface of one connected vehicle
#[async_trait]
pub trait VehicleService: Send + Sync + 'static {
    /// Block until the vehicle reports a usable position fix
    async fn wait_for_position_fix(&self) -> Result<(), VehicleError>;

    /// Open a fresh subscription to the position feed
    fn position_feed(&self) -> TelemetryFeed<Position>;

    /// Open a fresh subscription to the battery feed
    fn battery_feed(&self) -> TelemetryFeed<Battery>;

    async fn arm(&self) -> Result<(), VehicleError>;

    async fn disarm(&self) -> Result<(), VehicleError>;

    /// Stop the motors immediately, even while flying
    async fn kill(&self) -> Result<(), VehicleError>;

    /// Human-readable name for this backend
    fn name(&self) -> &'static str;
}

/// The single shared vehicle handle, cloned into every client session
pub type VehicleHandle = Arc<dyn VehicleService>;
