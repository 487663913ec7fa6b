//! In-memory vehicle for tests

use super::{Action, Battery, Position, TelemetryFeed, VehicleError, VehicleService};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Vehicle double with queued samples, call counters and injectable failures
///
/// Each feed subscription takes the next queued sample; the last one repeats.
pub struct ScriptedVehicle {
    positions: Mutex<VecDeque<Position>>,
    batteries: Mutex<VecDeque<Battery>>,
    fail_actions: AtomicBool,
    close_feeds: AtomicBool,
    arm_calls: AtomicUsize,
    disarm_calls: AtomicUsize,
    kill_calls: AtomicUsize,
    subscriptions: AtomicUsize,
    action_delay: Duration,
    actions_in_flight: AtomicUsize,
    max_actions_in_flight: AtomicUsize,
}

impl ScriptedVehicle {
    pub fn new() -> Self {
        Self {
            positions: Mutex::new(VecDeque::from([Position {
                latitude_deg: 47.3977419,
                longitude_deg: 8.5455938,
                relative_altitude_m: 10.5,
            }])),
            batteries: Mutex::new(VecDeque::from([Battery { voltage_v: 12.6 }])),
            fail_actions: AtomicBool::new(false),
            close_feeds: AtomicBool::new(false),
            arm_calls: AtomicUsize::new(0),
            disarm_calls: AtomicUsize::new(0),
            kill_calls: AtomicUsize::new(0),
            subscriptions: AtomicUsize::new(0),
            action_delay: Duration::ZERO,
            actions_in_flight: AtomicUsize::new(0),
            max_actions_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_positions(self, positions: Vec<Position>) -> Self {
        *self.positions.lock().unwrap() = positions.into();
        self
    }

    pub fn with_batteries(self, batteries: Vec<Battery>) -> Self {
        *self.batteries.lock().unwrap() = batteries.into();
        self
    }

    /// Make every action call fail
    pub fn failing_actions(self) -> Self {
        self.fail_actions.store(true, Ordering::SeqCst);
        self
    }

    /// Make every feed end without producing a value
    pub fn closed_feeds(self) -> Self {
        self.close_feeds.store(true, Ordering::SeqCst);
        self
    }

    /// Make every action take this long to complete
    pub fn with_action_delay(mut self, delay: Duration) -> Self {
        self.action_delay = delay;
        self
    }

    /// Most actions ever executing at the same time
    pub fn max_concurrent_actions(&self) -> usize {
        self.max_actions_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self, action: Action) -> usize {
        self.counter(action).load(Ordering::SeqCst)
    }

    /// Number of feed subscriptions opened so far
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    fn counter(&self, action: Action) -> &AtomicUsize {
        match action {
            Action::Arm => &self.arm_calls,
            Action::Disarm => &self.disarm_calls,
            Action::Kill => &self.kill_calls,
        }
    }

    fn next_sample<T: Copy>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        }
    }

    fn feed<T: Copy + Send + 'static>(&self, queue: &Mutex<VecDeque<T>>) -> TelemetryFeed<T> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        if self.close_feeds.load(Ordering::SeqCst) {
            return stream::empty().boxed();
        }
        match Self::next_sample(queue) {
            Some(sample) => stream::repeat(sample).boxed(),
            None => stream::empty().boxed(),
        }
    }

    async fn act(&self, action: Action) -> Result<(), VehicleError> {
        self.counter(action).fetch_add(1, Ordering::SeqCst);
        let in_flight = self.actions_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_actions_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if !self.action_delay.is_zero() {
            tokio::time::sleep(self.action_delay).await;
        }
        self.actions_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(VehicleError::Action {
                action,
                reason: "scripted failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VehicleService for ScriptedVehicle {
    async fn wait_for_position_fix(&self) -> Result<(), VehicleError> {
        Ok(())
    }

    fn position_feed(&self) -> TelemetryFeed<Position> {
        self.feed(&self.positions)
    }

    fn battery_feed(&self) -> TelemetryFeed<Battery> {
        self.feed(&self.batteries)
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
        "scripted"
    }
}
