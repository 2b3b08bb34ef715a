//! Unified error type for rxlive.

use rxlive_presence::PresenceError;
use rxlive_protocol::ProtocolError;
use rxlive_session::{StoreError, TokenError};
use rxlive_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `rxlive` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RxliveError {
    /// A transport-level error (connect, receive, close).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The held token is malformed, unparsable or expired.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Credential storage could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No outlet scope, or no usable session for it.
    #[error(transparent)]
    Presence(#[from] PresenceError),
}
