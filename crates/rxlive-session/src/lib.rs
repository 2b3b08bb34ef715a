//! Session validity and outlet scoping for rxlive.
//!
//! This crate answers two questions before any outlet-scoped work starts:
//!
//! 1. **Is the held credential usable?** [`CredentialStore`] holds the
//!    token and profile; [`is_valid`] / [`check`] judge the token as a pure
//!    function of `(token, now)`.
//! 2. **Which outlet is this user scoped to?** [`resolve_outlet_id`]
//!    collapses every historical profile shape into one [`OutletId`].
//!
//! # How it fits in the stack
//!
//! ```text
//! Presence Layer (above)  ← watches credentials, scopes channels by outlet
//!     ↕
//! Session Layer (this crate)  ← credential store, validator, outlet resolver
//!     ↕
//! Protocol Layer (below)  ← provides OutletId
//! ```
//!
//! [`OutletId`]: rxlive_protocol::OutletId

mod claims;
mod diagnostics;
mod error;
mod outlet;
mod profile;
mod store;
mod validator;

pub use claims::Claims;
pub use diagnostics::{diagnose, ProfileSummary, SessionReport, StorageStatus, TokenSummary};
pub use error::{StoreError, TokenError};
pub use outlet::{resolve_outlet_id, resolve_outlet_id_or_stored};
pub use profile::{OutletObject, OutletRef, UserProfile};
pub use store::{
    CredentialStore, CredentialWatch, Credentials, FileStore, KeyValueStore, MemoryStore,
    SessionIdentity, AUTH_TOKEN_KEY, USER_KEY,
};
pub use validator::{check, decode, is_valid, now_unix};
