//! Hydra Shared Protocol Types
//!
//! This crate provides the line protocol spoken between the telemetry relay
//! and its ground clients (GUI, control and planning programs): the command
//! keywords, the framing codec and the per-connection state machine.

pub mod codec;
pub mod state_machine;

use std::fmt;

/// Protocol limits and defaults
pub mod limits {
    /// Maximum bytes accepted for one command line (terminator excluded)
    pub const MAX_LINE_BYTES: usize = 100;

    /// Idle read timeout - a client silent this long is disconnected
    pub const IDLE_TIMEOUT_MS: u64 = 3000;

    /// Default listening host
    pub const DEFAULT_HOST: &str = "127.0.0.1";

    /// Default listening port
    pub const DEFAULT_PORT: u16 = 5000;
}

/// A single client request, parsed from one line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Current latitude in degrees
    Latitude,
    /// Current altitude relative to home, in metres
    Altitude,
    /// Current longitude in degrees
    Longitude,
    /// Current battery voltage
    Battery,
    /// Arm the motors
    Arm,
    /// Disarm the motors
    Disarm,
    /// Kill the motors immediately, even in flight
    Kill,
    /// Anything else; the text is kept for logging
    Unrecognized(String),
}

impl Command {
    /// Parse one line of client input.
    ///
    /// A trailing `\r\n` or `\n` is stripped; the rest must match a keyword
    /// exactly (case-sensitive, no trimming).
    pub fn parse(line: &str) -> Self {
        match strip_terminator(line) {
            "latitude" => Command::Latitude,
            "altitude" => Command::Altitude,
            "longitude" => Command::Longitude,
            "battery" => Command::Battery,
            "arm" => Command::Arm,
            "disarm" => Command::Disarm,
            "kill" => Command::Kill,
            other => Command::Unrecognized(other.to_string()),
        }
    }

    /// Wire keyword for this command, if it is a known one
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Command::Latitude => Some("latitude"),
            Command::Altitude => Some("altitude"),
            Command::Longitude => Some("longitude"),
            Command::Battery => Some("battery"),
            Command::Arm => Some("arm"),
            Command::Disarm => Some("disarm"),
            Command::Kill => Some("kill"),
            Command::Unrecognized(_) => None,
        }
    }

    /// True for commands that answer with a telemetry reading
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Command::Latitude | Command::Altitude | Command::Longitude | Command::Battery
        )
    }

    /// True for commands that change vehicle state
    pub fn is_action(&self) -> bool {
        matches!(self, Command::Arm | Command::Disarm | Command::Kill)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Unrecognized(text) => write!(f, "|{}|", text),
            known => f.write_str(known.keyword().unwrap_or_default()),
        }
    }
}

/// Strip one trailing line terminator (`\r\n` or `\n`)
pub fn strip_terminator(line: &str) -> &str {
    line.strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords() {
        assert_eq!(Command::parse("latitude\n"), Command::Latitude);
        assert_eq!(Command::parse("altitude\r\n"), Command::Altitude);
        assert_eq!(Command::parse("longitude"), Command::Longitude);
        assert_eq!(Command::parse("battery\n"), Command::Battery);
        assert_eq!(Command::parse("arm\n"), Command::Arm);
        assert_eq!(Command::parse("disarm\n"), Command::Disarm);
        assert_eq!(Command::parse("kill\n"), Command::Kill);
    }

    #[test]
    fn test_parse_is_exact() {
        assert_eq!(Command::parse("ARM\n"), Command::Unrecognized("ARM".into()));
        assert_eq!(Command::parse(" arm\n"), Command::Unrecognized(" arm".into()));
        assert_eq!(Command::parse("arming\n"), Command::Unrecognized("arming".into()));
        assert_eq!(Command::parse("lat\n"), Command::Unrecognized("lat".into()));
        assert_eq!(Command::parse("\n"), Command::Unrecognized(String::new()));
    }

    #[test]
    fn test_only_one_terminator_stripped() {
        assert_eq!(
            Command::parse("arm\n\n"),
            Command::Unrecognized("arm\n".into())
        );
        assert_eq!(Command::parse("arm\r"), Command::Unrecognized("arm\r".into()));
    }

    #[test]
    fn test_command_classes() {
        assert!(Command::Battery.is_query());
        assert!(!Command::Battery.is_action());
        assert!(Command::Kill.is_action());
        assert!(!Command::Unrecognized("foo".into()).is_query());
        assert!(!Command::Unrecognized("foo".into()).is_action());
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::Latitude.to_string(), "latitude");
        assert_eq!(Command::Unrecognized("foo".into()).to_string(), "|foo|");
    }
}
