//! Client sessions for ground programs
//!
//! This module handles:
//! - Accepting client connections and spawning one task per client
//! - The read-decode-dispatch loop with idle timeout
//! - Clean close on disconnect, malformed input or vehicle failure

mod connection;
mod listener;

pub use connection::SessionConfig;
pub use listener::Listener;
