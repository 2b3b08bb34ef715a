//! In-process connector backed by Tokio channels.
//!
//! Each successful [`MemoryConnector::connect`] creates a pipe: the client
//! half ([`MemoryConnection`]) goes to the caller and the server half
//! ([`MemoryPeer`]) is delivered through the [`MemoryListener`]. Whoever
//! holds the peer plays the server: it pushes frames, injects failures, or
//! drops the peer to simulate a lost connection.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::{Connection, ConnectionId, Connector, TransportError};

/// A frame travelling from the peer to the client, or an injected failure.
type Frame = Result<Vec<u8>, String>;

struct MemoryState {
    attempts: usize,
    refuse_next: usize,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// A [`Connector`] that connects to an in-process [`MemoryListener`].
///
/// Cheap to clone; clones share attempt counters and the listener.
#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    /// Creates a connector and the listener that receives its peers.
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(Mutex::new(MemoryState {
                attempts: 0,
                refuse_next: 0,
                peers: tx,
            })),
        };
        (connector, MemoryListener { peers: rx })
    }

    /// Makes the next `count` connection attempts fail.
    pub fn refuse_next(&self, count: usize) {
        self.lock().refuse_next = count;
    }

    /// Total number of connection attempts, successful or not.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;
    type Error = TransportError;

    async fn connect(
        &self,
        outlet: &str,
        token: &str,
    ) -> Result<Self::Connection, Self::Error> {
        let mut state = self.lock();
        state.attempts += 1;

        if state.refuse_next > 0 {
            state.refuse_next -= 1;
            return Err(TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory connector refused the attempt",
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::next();
        let peer = MemoryPeer {
            id,
            outlet: outlet.to_string(),
            token: token.to_string(),
            frames: tx,
        };
        // A missing listener just means nobody plays the server; the
        // connection then reads as closed.
        let _ = state.peers.send(peer);

        tracing::trace!(%id, outlet, "memory connection opened");
        Ok(MemoryConnection { id, frames: rx })
    }
}

/// Receives the server halves of connections opened by a [`MemoryConnector`].
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Waits for the next connection. Returns `None` once every connector
    /// clone has been dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// Returns an already-opened connection without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }
}

/// The server half of an in-memory connection.
///
/// Dropping it closes the connection from the server side.
pub struct MemoryPeer {
    id: ConnectionId,
    outlet: String,
    token: String,
    frames: mpsc::UnboundedSender<Frame>,
}

impl MemoryPeer {
    /// The connection this peer belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The outlet the client asked for.
    pub fn outlet(&self) -> &str {
        &self.outlet
    }

    /// The token the client presented.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Delivers a frame to the client. Returns `false` if the client is gone.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> bool {
        self.frames.send(Ok(data.into())).is_ok()
    }

    /// Makes the client's next `recv` fail with a transport error.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.frames.send(Err(reason.into())).is_ok()
    }

    /// Returns `true` once the client has closed or dropped its half.
    pub fn is_closed(&self) -> bool {
        self.frames.is_closed()
    }

    /// Waits until the client has closed or dropped its half.
    pub async fn closed(&self) {
        self.frames.closed().await
    }
}

/// The client half of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    frames: mpsc::UnboundedReceiver<Frame>,
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, Self::Error> {
        match self.frames.recv().await {
            Some(Ok(data)) => Ok(Some(data)),
            Some(Err(reason)) => Err(TransportError::ReceiveFailed(
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, reason),
            )),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.frames.close();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
