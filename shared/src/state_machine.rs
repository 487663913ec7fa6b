//! Client Session State Machine
//!
//! Every client connection cycles `AwaitingInput -> Dispatching ->
//! AwaitingInput` until it reaches the terminal `Closed` state.

use std::fmt;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// No line arrived within the idle timeout
    IdleTimeout,
    /// Client closed its side of the connection
    PeerClosed,
    /// Input was not valid UTF-8 or exceeded the line limit
    MalformedInput,
    /// A telemetry sample or action call against the vehicle failed
    VehicleFailure,
    /// Socket read or write failed
    IoFailure,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::IdleTimeout => write!(f, "idle timeout"),
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::MalformedInput => write!(f, "malformed input"),
            CloseReason::VehicleFailure => write!(f, "vehicle failure"),
            CloseReason::IoFailure => write!(f, "I/O failure"),
        }
    }
}

/// Session states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next line, bounded by the idle timeout
    AwaitingInput,
    /// Executing the command parsed from the last line
    Dispatching,
    /// Terminal; the socket is released
    Closed(CloseReason),
}

/// Events that drive the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A complete line was decoded
    LineReceived,
    /// Idle timeout elapsed
    IdleTimeout,
    /// Zero-byte read
    PeerClosed,
    /// Decode failed
    MalformedInput,
    /// Response written (or nothing to write)
    DispatchComplete,
    /// Vehicle call failed
    VehicleFailure,
    /// Socket error
    IoFailure,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(SessionState),
    /// Transition was invalid from current state
    Invalid {
        from: SessionState,
        event: SessionEvent,
    },
}

/// State machine for one client connection
#[derive(Debug)]
pub struct SessionStateMachine {
    current_state: SessionState,
    lines_received: u64,
    commands_completed: u64,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    /// Create a new state machine waiting for input
    pub fn new() -> Self {
        Self {
            current_state: SessionState::AwaitingInput,
            lines_received: 0,
            commands_completed: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.current_state
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.current_state {
            SessionState::Closed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn lines_received(&self) -> u64 {
        self.lines_received
    }

    pub fn commands_completed(&self) -> u64 {
        self.commands_completed
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: SessionEvent) -> TransitionResult {
        match self.get_next_state(event) {
            Some(state) => {
                match event {
                    SessionEvent::LineReceived => self.lines_received += 1,
                    SessionEvent::DispatchComplete => self.commands_completed += 1,
                    _ => {}
                }
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        match (self.current_state, event) {
            // Nothing leaves Closed
            (Closed(_), _) => None,

            // From AwaitingInput
            (AwaitingInput, LineReceived) => Some(Dispatching),
            (AwaitingInput, IdleTimeout) => Some(Closed(CloseReason::IdleTimeout)),
            (AwaitingInput, PeerClosed) => Some(Closed(CloseReason::PeerClosed)),
            (AwaitingInput, MalformedInput) => Some(Closed(CloseReason::MalformedInput)),

            // From Dispatching
            (Dispatching, DispatchComplete) => Some(AwaitingInput),
            (Dispatching, VehicleFailure) => Some(Closed(CloseReason::VehicleFailure)),

            // Socket errors can happen on either side of the loop
            (AwaitingInput | Dispatching, IoFailure) => Some(Closed(CloseReason::IoFailure)),

            // Invalid transition
            _ => None,
        }
    }
}
