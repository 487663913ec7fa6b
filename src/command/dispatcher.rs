//! Command dispatcher - executes parsed commands against the vehicle

use bytes::Bytes;
use futures::StreamExt;
use hydra_shared::{codec, Command};
use tracing::{debug, info};

use crate::vehicle::{Battery, Position, VehicleError, VehicleHandle};

/// Result of dispatching one command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Query answered; the line must be written back to the client
    Reading(Bytes),
    /// Action submitted to the vehicle; nothing is sent back
    Submitted,
    /// Input was not a known command; nothing is sent back
    Ignored,
}

/// Executes client commands against the shared vehicle handle
///
/// Actions are not serialized across sessions: two clients racing
/// arm/kill calls reach the vehicle in whatever order they complete.
#[derive(Clone)]
pub struct CommandDispatcher {
    vehicle: VehicleHandle,
}

impl CommandDispatcher {
    /// Create a new dispatcher over the vehicle handle
    pub fn new(vehicle: VehicleHandle) -> Self {
        Self { vehicle }
    }

    /// Execute a command and return what, if anything, goes back to the client
    pub async fn dispatch(&self, command: &Command) -> Result<CommandResult, VehicleError> {
        if command.is_action() {
            info!("Action requested: {}", command);
        } else if command.is_query() {
            debug!("Query: {}", command);
        }

        let result = match command {
            Command::Latitude => {
                let position = self.sample_position().await?;
                CommandResult::Reading(codec::encode_reading(position.latitude_deg))
            }
            Command::Altitude => {
                let position = self.sample_position().await?;
                CommandResult::Reading(codec::encode_reading(position.relative_altitude_m))
            }
            Command::Longitude => {
                let position = self.sample_position().await?;
                CommandResult::Reading(codec::encode_reading(position.longitude_deg))
            }
            Command::Battery => {
                let battery = self.sample_battery().await?;
                CommandResult::Reading(codec::encode_reading(battery.voltage_v))
            }
            Command::Arm => {
                self.vehicle.arm().await?;
                CommandResult::Submitted
            }
            Command::Disarm => {
                self.vehicle.disarm().await?;
                CommandResult::Submitted
            }
            Command::Kill => {
                self.vehicle.kill().await?;
                CommandResult::Submitted
            }
            Command::Unrecognized(text) => {
                info!("Data requested not supported: |{}|", text);
                CommandResult::Ignored
            }
        };

        Ok(result)
    }

    /// Take one value from a fresh position subscription
    async fn sample_position(&self) -> Result<Position, VehicleError> {
        let mut feed = self.vehicle.position_feed();
        feed.next()
            .await
            .ok_or(VehicleError::FeedClosed { feed: "position" })
    }

    /// Take one value from a fresh battery subscription
    async fn sample_battery(&self) -> Result<Battery, VehicleError> {
        let mut feed = self.vehicle.battery_feed();
        feed.next()
            .await
            .ok_or(VehicleError::FeedClosed { feed: "battery" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::scripted::ScriptedVehicle;
    use crate::vehicle::Action;
    use std::sync::Arc;

    fn reading(text: &str) -> CommandResult {
        CommandResult::Reading(Bytes::from(text.to_string()))
    }

    #[tokio::test]
    async fn test_query_commands_render_one_line() {
        let dispatcher = CommandDispatcher::new(Arc::new(ScriptedVehicle::new()));

        assert_eq!(
            dispatcher.dispatch(&Command::Latitude).await.unwrap(),
            reading("47.3977419\n")
        );
        assert_eq!(
            dispatcher.dispatch(&Command::Longitude).await.unwrap(),
            reading("8.5455938\n")
        );
        assert_eq!(
            dispatcher.dispatch(&Command::Altitude).await.unwrap(),
            reading("10.5\n")
        );
        assert_eq!(
            dispatcher.dispatch(&Command::Battery).await.unwrap(),
            reading("12.6\n")
        );
    }

    #[tokio::test]
    async fn test_each_query_samples_fresh() {
        let vehicle = Arc::new(ScriptedVehicle::new().with_positions(vec![
            Position {
                latitude_deg: 1.5,
                longitude_deg: 0.0,
                relative_altitude_m: 0.0,
            },
            Position {
                latitude_deg: 2.5,
                longitude_deg: 0.0,
                relative_altitude_m: 0.0,
            },
        ]));
        let dispatcher = CommandDispatcher::new(vehicle.clone());

        assert_eq!(dispatcher.dispatch(&Command::Latitude).await.unwrap(), reading("1.5\n"));
        assert_eq!(dispatcher.dispatch(&Command::Latitude).await.unwrap(), reading("2.5\n"));
        assert_eq!(vehicle.subscriptions(), 2);
    }

    #[tokio::test]
    async fn test_actions_submit_without_reply() {
        let vehicle = Arc::new(ScriptedVehicle::new());
        let dispatcher = CommandDispatcher::new(vehicle.clone());

        for command in [Command::Arm, Command::Disarm, Command::Kill] {
            assert_eq!(
                dispatcher.dispatch(&command).await.unwrap(),
                CommandResult::Submitted
            );
        }

        assert_eq!(vehicle.calls(Action::Arm), 1);
        assert_eq!(vehicle.calls(Action::Disarm), 1);
        assert_eq!(vehicle.calls(Action::Kill), 1);
        assert_eq!(vehicle.subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_unrecognized_is_ignored() {
        let vehicle = Arc::new(ScriptedVehicle::new());
        let dispatcher = CommandDispatcher::new(vehicle.clone());

        let result = dispatcher
            .dispatch(&Command::Unrecognized("ARM".into()))
            .await
            .unwrap();
        assert_eq!(result, CommandResult::Ignored);
        assert_eq!(vehicle.calls(Action::Arm), 0);
    }

    #[tokio::test]
    async fn test_action_failure_propagates() {
        let dispatcher = CommandDispatcher::new(Arc::new(ScriptedVehicle::new().failing_actions()));

        let result = dispatcher.dispatch(&Command::Kill).await;
        assert!(matches!(
            result,
            Err(VehicleError::Action {
                action: Action::Kill,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_closed_feed_is_an_error() {
        let dispatcher = CommandDispatcher::new(Arc::new(ScriptedVehicle::new().closed_feeds()));

        let result = dispatcher.dispatch(&Command::Battery).await;
        assert!(matches!(
            result,
            Err(VehicleError::FeedClosed { feed: "battery" })
        ));
    }
}
