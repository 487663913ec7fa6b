//! Relay configuration and command-line parsing

use clap::Parser;
use hydra_shared::{codec::Framing, limits};
use std::time::Duration;

use crate::autopilot::{FcConfig, FcConnectionType};
use crate::session::SessionConfig;

/// Command-line interface of the relay binary
#[derive(Parser, Debug)]
#[command(
    name = "hydra-relay",
    version,
    about = "Relay live drone telemetry and flight actions to TCP ground clients"
)]
pub struct Cli {
    /// Host to listen on for ground clients
    #[arg(long, default_value = limits::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on for ground clients
    #[arg(short, long, default_value_t = limits::DEFAULT_PORT)]
    pub port: u16,

    /// Close a client after this long without a command
    #[arg(long, default_value_t = limits::IDLE_TIMEOUT_MS)]
    pub idle_timeout_ms: u64,

    /// Longest accepted command line, in bytes
    #[arg(long, default_value_t = limits::MAX_LINE_BYTES, value_parser = parse_line_limit)]
    pub max_line_bytes: usize,

    /// Treat every socket read as one command instead of buffering lines
    #[arg(long)]
    pub per_read_framing: bool,

    /// Autopilot link, e.g. udp://:14555, tcp://127.0.0.1:5760, serial:///dev/ttyUSB0:57600
    #[arg(long, default_value = "udp://:14555")]
    pub vehicle: FcConnectionType,

    /// MAVLink system ID of the autopilot
    #[arg(long, default_value_t = 1)]
    pub target_system: u8,

    /// Start serving clients without waiting for a GPS fix
    #[arg(long)]
    pub skip_fix_wait: bool,
}

fn parse_line_limit(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("line limit must be at least 1 byte".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Resolved relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listening host
    pub host: String,
    /// Listening port
    pub port: u16,
    /// Idle timeout per client
    pub idle_timeout: Duration,
    /// Byte limit for one command line
    pub max_line_bytes: usize,
    /// Client input framing
    pub framing: Framing,
    /// Block until the vehicle has a position fix before accepting clients
    pub wait_for_fix: bool,
    /// Autopilot link
    pub vehicle: FcConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: limits::DEFAULT_HOST.into(),
            port: limits::DEFAULT_PORT,
            idle_timeout: Duration::from_millis(limits::IDLE_TIMEOUT_MS),
            max_line_bytes: limits::MAX_LINE_BYTES,
            framing: Framing::Lines,
            wait_for_fix: true,
            vehicle: FcConfig::default(),
        }
    }
}

impl RelayConfig {
    /// `host:port` to bind
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings handed to every client session
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: self.idle_timeout,
            max_line_bytes: self.max_line_bytes,
            framing: self.framing,
        }
    }
}

impl From<Cli> for RelayConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            idle_timeout: Duration::from_millis(cli.idle_timeout_ms),
            max_line_bytes: cli.max_line_bytes,
            framing: if cli.per_read_framing {
                Framing::PerRead
            } else {
                Framing::Lines
            },
            wait_for_fix: !cli.skip_fix_wait,
            vehicle: FcConfig {
                connection: cli.vehicle,
                target_system: cli.target_system,
                ..Default::default()
            },
        }
    }
}
