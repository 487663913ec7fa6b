//! Accept loop spawning one session task per client

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, info_span, warn, Instrument};

use super::connection::{ClientSession, SessionConfig};
use crate::command::CommandDispatcher;
use crate::vehicle::VehicleHandle;

/// Back-off after a failed accept (e.g. out of file descriptors)
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

/// Listens for ground clients and serves each one independently
pub struct Listener {
    listener: TcpListener,
    dispatcher: CommandDispatcher,
    config: SessionConfig,
    next_session_id: AtomicU64,
}

impl Listener {
    /// Bind the listening socket
    pub async fn bind(
        addr: &str,
        vehicle: VehicleHandle,
        config: SessionConfig,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            dispatcher: CommandDispatcher::new(vehicle),
            config,
            next_session_id: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until `shutdown` resolves
    ///
    /// Sessions already running are not cancelled.
    pub async fn serve_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Listener shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, addr)) => self.spawn_session(socket, addr),
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
                    }
                },
            }
        }
    }

    fn spawn_session(&self, socket: TcpStream, addr: SocketAddr) {
        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Connection from: {} (session {})", addr, id);

        if let Err(e) = socket.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let session = ClientSession::new(id, addr, socket, self.dispatcher.clone(), self.config);
        let span = info_span!("session", id = session.id(), peer = %session.peer());
        tokio::spawn(
            async move {
                session.run().await;
            }
            .instrument(span),
        );
    }
}
