//! # rxlive
//!
//! Outlet presence and session validity for multi-outlet dashboards.
//!
//! rxlive tracks which users are online at an outlet over a per-outlet
//! WebSocket channel, and makes sure that channel only runs while the
//! held credential is usable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rxlive::prelude::*;
//!
//! # async fn run() -> Result<(), RxliveError> {
//! let store = Arc::new(CredentialStore::load(FileStore::new("session.json")));
//! let mut presence = OutletPresenceBuilder::new("wss://api.example.com/presence").build(store);
//!
//! presence.refresh().await;
//! let mut updates = presence.subscribe();
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow_and_update().clone();
//!     println!("{} online", snapshot.online_users.len());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod presence;
pub mod telemetry;

pub use error::RxliveError;
pub use presence::OutletPresence;
#[cfg(feature = "websocket")]
pub use presence::OutletPresenceBuilder;

pub use rxlive_backoff as backoff;
pub use rxlive_presence as channel;
pub use rxlive_protocol as protocol;
pub use rxlive_session as session;
pub use rxlive_transport as transport;

pub mod prelude {
    pub use crate::{OutletPresence, RxliveError};
    #[cfg(feature = "websocket")]
    pub use crate::OutletPresenceBuilder;

    pub use rxlive_backoff::BackoffConfig;
    pub use rxlive_presence::{
        ChannelState, PresenceClient, PresenceConfig, PresenceHub, PresenceLease, PresenceSnapshot,
    };
    pub use rxlive_protocol::{OutletId, PresenceEntry, PresenceEvent, UserId};
    pub use rxlive_session::{
        is_valid, resolve_outlet_id, CredentialStore, CredentialWatch, FileStore, MemoryStore,
        SessionReport, UserProfile,
    };
    pub use rxlive_transport::{Connection, Connector};
    #[cfg(feature = "websocket")]
    pub use rxlive_transport::WebSocketConnector;
}
