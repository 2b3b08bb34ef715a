//! Wire protocol for rxlive presence channels.
//!
//! This crate defines what travels over a presence connection:
//!
//! - **Types** ([`PresenceEvent`], [`PresenceEntry`], [`UserId`],
//!   [`OutletId`]): the identities and events the server pushes.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames are turned
//!   into events.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (PresenceEvent) → Presence client (online set)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{OutletId, PresenceEntry, PresenceEvent, UserId};
