//! Individual client session handling

use hydra_shared::{
    codec::{self, Framing, LineDecoder, LineError},
    limits,
    state_machine::{CloseReason, SessionEvent, SessionStateMachine, TransitionResult},
    Command,
};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::command::{CommandDispatcher, CommandResult};
use crate::vehicle::VehicleError;

/// Per-session settings
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Longest wait for the next line before the server hangs up
    pub idle_timeout: Duration,
    /// Byte limit for one command line
    pub max_line_bytes: usize,
    pub framing: Framing,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(limits::IDLE_TIMEOUT_MS),
            max_line_bytes: limits::MAX_LINE_BYTES,
            framing: Framing::Lines,
        }
    }
}

/// Everything that ends a session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No input for {0:?}")]
    ClientTimeout(Duration),

    #[error("Client closed the connection")]
    ClientDisconnected,

    #[error("Malformed input: {0}")]
    Decode(#[from] LineError),

    #[error("Vehicle call failed: {0}")]
    Vehicle(#[from] VehicleError),

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// State machine event this error drives
    fn event(&self) -> SessionEvent {
        match self {
            SessionError::ClientTimeout(_) => SessionEvent::IdleTimeout,
            SessionError::ClientDisconnected => SessionEvent::PeerClosed,
            SessionError::Decode(_) => SessionEvent::MalformedInput,
            SessionError::Vehicle(_) => SessionEvent::VehicleFailure,
            SessionError::Io(_) => SessionEvent::IoFailure,
        }
    }
}

/// Server side of one client connection
pub struct ClientSession<S> {
    id: u64,
    peer: SocketAddr,
    stream: S,
    dispatcher: CommandDispatcher,
    config: SessionConfig,
    fsm: SessionStateMachine,
    decoder: LineDecoder,
    read_buf: Vec<u8>,
}

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a session over an accepted stream
    pub fn new(
        id: u64,
        peer: SocketAddr,
        stream: S,
        dispatcher: CommandDispatcher,
        config: SessionConfig,
    ) -> Self {
        Self {
            id,
            peer,
            stream,
            dispatcher,
            config,
            fsm: SessionStateMachine::new(),
            decoder: LineDecoder::with_max_line(config.max_line_bytes),
            read_buf: vec![0u8; config.max_line_bytes.max(1)],
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Serve commands until the session closes, then release the socket
    pub async fn run(mut self) -> CloseReason {
        let reason = loop {
            if let Err(e) = self.serve_next().await {
                break self.close(e);
            }
        };

        if let Err(e) = self.stream.shutdown().await {
            debug!("Shutdown after close failed: {}", e);
        }

        info!(
            "Session closed ({}) after {} line(s), {} command(s)",
            reason,
            self.fsm.lines_received(),
            self.fsm.commands_completed()
        );
        reason
    }

    /// One trip round the loop: read a line, dispatch it, write the reply
    async fn serve_next(&mut self) -> Result<(), SessionError> {
        let line = self.next_line().await?;
        self.transition(SessionEvent::LineReceived);

        let command = Command::parse(&line);
        if let CommandResult::Reading(reply) = self.dispatcher.dispatch(&command).await? {
            // Drain before reading the next command
            self.stream.write_all(&reply).await?;
            self.stream.flush().await?;
        }

        self.transition(SessionEvent::DispatchComplete);
        Ok(())
    }

    /// Wait for the next command line, bounded by the idle timeout
    async fn next_line(&mut self) -> Result<String, SessionError> {
        let deadline = Instant::now() + self.config.idle_timeout;

        match self.config.framing {
            Framing::Lines => loop {
                if let Some(line) = self.decoder.decode_next()? {
                    return Ok(line);
                }
                let n = self.read_chunk(deadline).await?;
                self.decoder.extend(&self.read_buf[..n]);
            },
            Framing::PerRead => {
                let n = self.read_chunk(deadline).await?;
                Ok(codec::decode_chunk(&self.read_buf[..n])?)
            }
        }
    }

    async fn read_chunk(&mut self, deadline: Instant) -> Result<usize, SessionError> {
        match timeout_at(deadline, self.stream.read(&mut self.read_buf)).await {
            Err(_) => Err(SessionError::ClientTimeout(self.config.idle_timeout)),
            Ok(Ok(0)) => Err(SessionError::ClientDisconnected),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Log why the session is ending and move to `Closed`
    fn close(&mut self, err: SessionError) -> CloseReason {
        debug!("Closing from {:?}", self.fsm.state());
        match &err {
            SessionError::ClientTimeout(_) => {
                info!("Connection terminated by server: {}", err);
            }
            SessionError::ClientDisconnected => {
                if self.decoder.buffer_len() > 0 {
                    debug!(
                        "Discarding {} bytes of unterminated input",
                        self.decoder.buffer_len()
                    );
                }
                info!("Client disconnected");
            }
            SessionError::Decode(_) | SessionError::Io(_) => warn!("{}", err),
            SessionError::Vehicle(_) => error!("{}", err),
        }

        self.transition(err.event());
        self.fsm.close_reason().unwrap_or(CloseReason::IoFailure)
    }

    fn transition(&mut self, event: SessionEvent) {
        if let TransitionResult::Invalid { from, event } = self.fsm.process_event(event) {
            debug!("Ignoring {:?} in state {:?}", event, from);
        }
    }
}
