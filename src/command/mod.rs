//! Command dispatch for client sessions
//!
//! This module handles:
//! - Sampling telemetry feeds for query commands
//! - Submitting arm/disarm/kill actions to the vehicle
//! - Rendering the single response line a query produces

mod dispatcher;

pub use dispatcher::{CommandDispatcher, CommandResult};
