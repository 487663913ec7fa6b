//! Flight Controller Connection
//!
//! Owns the MAVLink link to the autopilot over serial, UDP or TCP. A
//! dedicated receive thread fans every incoming message out on a broadcast
//! channel, so each telemetry subscription gets its own receiver.

use anyhow::{anyhow, Result};
use mavlink::ardupilotmega::MavMessage;
use mavlink::error::MessageReadError;
use mavlink::{MavConnection, MavHeader};
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::telemetry::TelemetryMonitor;
use crate::vehicle::VehicleError;

/// Capacity of the inbound message fan-out
const INBOUND_CAPACITY: usize = 256;

/// Default baud rate for serial links
pub const DEFAULT_SERIAL_BAUD: u32 = 57600;

type SharedConnection = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

/// Connection type for flight controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FcConnectionType {
    /// Serial port connection (e.g., "/dev/ttyUSB0")
    Serial { port: String, baud: u32 },
    /// Listen for the autopilot on a UDP address (e.g., "0.0.0.0:14555")
    Udp { address: String },
    /// Send to the autopilot at a UDP address
    UdpOut { address: String },
    /// Connect out to a TCP address (e.g., "127.0.0.1:5760")
    Tcp { address: String },
    /// A raw mavlink connection string, passed through untouched
    Raw(String),
}

impl Default for FcConnectionType {
    fn default() -> Self {
        // The autopilot streams to us on 14555
        Self::Udp {
            address: "0.0.0.0:14555".into(),
        }
    }
}

impl FcConnectionType {
    /// Connection string understood by `mavlink::connect`
    pub fn to_mavlink_address(&self) -> String {
        match self {
            FcConnectionType::Serial { port, baud } => format!("serial:{}:{}", port, baud),
            FcConnectionType::Udp { address } => format!("udpin:{}", address),
            FcConnectionType::UdpOut { address } => format!("udpout:{}", address),
            FcConnectionType::Tcp { address } => format!("tcpout:{}", address),
            FcConnectionType::Raw(address) => address.clone(),
        }
    }
}

impl fmt::Display for FcConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_mavlink_address())
    }
}

impl FromStr for FcConnectionType {
    type Err = VehicleError;

    /// Accepts `udp://[host]:port`, `udpout://host:port`, `tcp://host:port`,
    /// `serial:///dev/path[:baud]`, or a raw mavlink string such as `udpin:...`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("udp://") {
            Ok(Self::Udp {
                address: host_port(rest, "0.0.0.0", s)?,
            })
        } else if let Some(rest) = s.strip_prefix("udpout://") {
            Ok(Self::UdpOut {
                address: host_port(rest, "127.0.0.1", s)?,
            })
        } else if let Some(rest) = s.strip_prefix("tcp://") {
            Ok(Self::Tcp {
                address: host_port(rest, "127.0.0.1", s)?,
            })
        } else if let Some(rest) = s.strip_prefix("serial://") {
            serial_path(rest, s)
        } else if ["udpin:", "udpout:", "udpbcast:", "tcpin:", "tcpout:", "serial:"]
            .iter()
            .any(|scheme| s.starts_with(scheme))
        {
            Ok(Self::Raw(s.to_string()))
        } else {
            Err(VehicleError::InvalidAddress(s.to_string()))
        }
    }
}

/// Normalise `host:port`, filling in an empty host
fn host_port(rest: &str, default_host: &str, original: &str) -> Result<String, VehicleError> {
    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| VehicleError::InvalidAddress(original.to_string()))?;
    let port: u16 = port
        .parse()
        .map_err(|_| VehicleError::InvalidAddress(original.to_string()))?;
    let host = if host.is_empty() { default_host } else { host };
    Ok(format!("{}:{}", host, port))
}

/// Parse `/dev/path[:baud]`
fn serial_path(rest: &str, original: &str) -> Result<FcConnectionType, VehicleError> {
    let (port, baud) = match rest.rsplit_once(':') {
        Some((port, baud)) => {
            let baud = baud
                .parse()
                .map_err(|_| VehicleError::InvalidAddress(original.to_string()))?;
            (port, baud)
        }
        None => (rest, DEFAULT_SERIAL_BAUD),
    };
    if port.is_empty() {
        return Err(VehicleError::InvalidAddress(original.to_string()));
    }
    Ok(FcConnectionType::Serial {
        port: port.to_string(),
        baud,
    })
}

/// Configuration for flight controller connection
#[derive(Debug, Clone)]
pub struct FcConfig {
    /// Connection type and parameters
    pub connection: FcConnectionType,
    /// System ID for this relay
    pub system_id: u8,
    /// Component ID for this relay
    pub component_id: u8,
    /// Target system ID (flight controller)
    pub target_system: u8,
    /// Target component ID (autopilot)
    pub target_component: u8,
    /// How long to wait for the first autopilot heartbeat
    pub heartbeat_timeout: Duration,
    /// Interval of the heartbeat we send to the autopilot
    pub gcs_heartbeat_interval: Duration,
}

impl Default for FcConfig {
    fn default() -> Self {
        Self {
            connection: FcConnectionType::default(),
            system_id: 255,      // Ground station
            component_id: 190,   // MAV_COMP_ID_MISSIONPLANNER
            target_system: 1,    // Autopilot
            target_component: 1, // MAV_COMP_ID_AUTOPILOT1
            heartbeat_timeout: Duration::from_secs(10),
            gcs_heartbeat_interval: Duration::from_secs(1),
        }
    }
}

/// Flight controller connection
pub struct FlightController {
    config: FcConfig,
    connection: SharedConnection,
    /// Template receiver; every subscription is resubscribed from it
    inbound: broadcast::Receiver<MavMessage>,
    /// Set while the receive thread is alive
    connected: Arc<AtomicBool>,
}

impl FlightController {
    /// Open the link and start the receive thread
    pub async fn connect(config: FcConfig) -> Result<Self, VehicleError> {
        let address = config.connection.to_mavlink_address();
        info!("[MAVLink] Connecting to flight controller at {}", address);

        // Serial and TCP opens block
        let connection = tokio::task::spawn_blocking(move || {
            mavlink::connect::<MavMessage>(&address)
        })
        .await
        .map_err(|e| VehicleError::Connect(e.to_string()))?
        .map_err(|e| VehicleError::Connect(e.to_string()))?;
        let connection: SharedConnection = Arc::from(connection);

        let (inbound_tx, inbound) = broadcast::channel(INBOUND_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));

        let rx_connection = connection.clone();
        let rx_connected = connected.clone();
        std::thread::Builder::new()
            .name("mavlink-rx".into())
            .spawn(move || receive_loop(move || rx_connection.recv(), inbound_tx, rx_connected))
            .map_err(|e| VehicleError::Connect(e.to_string()))?;

        info!("[MAVLink] Link open");

        Ok(Self {
            config,
            connection,
            inbound,
            connected,
        })
    }

    /// Check if the receive side of the link is still alive
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Subscribe to every message received from now on
    pub fn subscribe(&self) -> broadcast::Receiver<MavMessage> {
        self.inbound.resubscribe()
    }

    /// Send a MAVLink message to the flight controller
    pub async fn send(&self, msg: MavMessage) -> Result<()> {
        let connection = self.connection.clone();
        let header = self.make_header();

        tokio::task::spawn_blocking(move || connection.send(&header, &msg))
            .await
            .map_err(|e| anyhow!("Send task failed: {}", e))?
            .map_err(|e| anyhow!("Send failed: {}", e))?;
        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &FcConfig {
        &self.config
    }

    /// Create MAVLink header for sending messages
    pub fn make_header(&self) -> MavHeader {
        MavHeader {
            system_id: self.config.system_id,
            component_id: self.config.component_id,
            sequence: 0, // Will be set by connection
        }
    }
}

/// Blocking receive loop; ends when the link is gone
///
/// Any read error other than a timeout or interruption counts as link loss.
fn receive_loop<F>(mut recv: F, inbound: broadcast::Sender<MavMessage>, connected: Arc<AtomicBool>)
where
    F: FnMut() -> Result<(MavHeader, MavMessage), MessageReadError>,
{
    let mut monitor = TelemetryMonitor::new();

    loop {
        match recv() {
            Ok((_header, msg)) => {
                monitor.observe(&msg);
                // No subscribers is normal between client queries
                let _ = inbound.send(msg);
            }
            Err(MessageReadError::Io(ref e)) if is_transient(e) => {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(MessageReadError::Io(e)) => {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    error!("[MAVLink] Link closed by flight controller");
                } else {
                    error!("[MAVLink] Link lost: {}", e);
                }
                if monitor.is_armed() == Some(true) {
                    error!("[MAVLink] Link lost while vehicle was ARMED");
                }
                break;
            }
            Err(e) => {
                debug!("[MAVLink] Dropping unparseable frame: {}", e);
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    // Dropping the sender closes every open feed
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
