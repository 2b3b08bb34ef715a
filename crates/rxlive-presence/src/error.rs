//! Error types for the presence layer.
//!
//! Transport failures never show up here: the channel recovers from them
//! on its own.

use rxlive_protocol::OutletId;

/// Errors a presence caller can see.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// No outlet could be resolved from the profile, so there is nothing
    /// to scope a channel by.
    #[error("no outlet scope available for the current profile")]
    UnresolvedOutlet,

    /// The held credential is missing or expired, so the channel for
    /// this outlet stays disconnected until the user signs in again.
    #[error("session is not valid, presence for outlet {0} is paused")]
    InvalidSession(OutletId),
}
