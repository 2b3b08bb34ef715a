//! Client-side transport abstraction for rxlive.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! how a presence channel reaches the server. The presence client only
//! ever talks to these traits, so it can run against a real WebSocket
//! endpoint in production and against an in-process pipe in tests.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket connector via `tokio-tungstenite`
//! - `memory`: in-process connector for tests and demos

mod error;
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{MemoryConnection, MemoryConnector, MemoryListener, MemoryPeer};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs across all connectors.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique `ConnectionId`.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens outbound connections to a presence endpoint.
///
/// One call to [`connect`](Connector::connect) is one connection attempt.
/// Retrying, backoff and giving up are the caller's business.
///
/// The returned futures are `Send` so a connector can be driven from a
/// spawned Tokio task.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;
    /// The error type for connection attempts.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Opens a connection scoped to `outlet`, authenticated with `token`.
    fn connect(
        &self,
        outlet: &str,
        token: &str,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;
}

/// A single open connection that delivers inbound frames.
pub trait Connection: Send + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Receives the next frame from the server.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the connection.
    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }
}
