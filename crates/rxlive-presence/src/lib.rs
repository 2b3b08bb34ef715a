//! Per-outlet presence channels for rxlive.
//!
//! A presence channel is one connection, scoped to an outlet, over which
//! the server pushes who is online there. Each channel runs as an
//! isolated Tokio task (actor model) that owns the socket, the online set
//! and the reconnect timer.
//!
//! # Key types
//!
//! - [`PresenceClient`]: start/stop one channel, read snapshots
//! - [`PresenceHub`]: share one channel per outlet between many consumers
//! - [`PresenceSnapshot`]: what a consumer renders
//! - [`ChannelState`]: lifecycle state machine
//! - [`PresenceConfig`]: timeouts and reconnect backoff
//! - [`OnlineSet`]: the online-user set and its merge rules

mod client;
mod config;
mod error;
mod hub;
mod roster;

pub use client::{PresenceClient, PresenceSnapshot};
pub use config::{ChannelState, PresenceConfig};
pub use error::PresenceError;
pub use hub::{PresenceHub, PresenceLease};
pub use roster::OnlineSet;
