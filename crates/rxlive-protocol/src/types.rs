//! Core protocol types for presence channels.
//!
//! Everything in this module either travels on the wire (presence events
//! pushed by the server) or names something the wire refers to (users
//! and outlets).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a user.
///
/// Newtype over `String` so a user id can't be passed where an outlet id
/// is expected. `#[serde(transparent)]` keeps it a bare string on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The canonical identifier of an outlet (one pharmacy location).
///
/// Profiles reference outlets in several historical shapes; all of them
/// are resolved to this one type before anything is scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutletId(String);

impl OutletId {
    /// Wraps a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Presence entries and events
// ---------------------------------------------------------------------------

/// One user currently connected to an outlet's channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// Who is online.
    #[serde(rename = "userId")]
    pub user_id: UserId,
    /// Their role at the outlet (e.g. `"pharmacist"`). Empty if the
    /// server didn't say.
    #[serde(default)]
    pub role: String,
}

impl PresenceEntry {
    /// Convenience constructor.
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role: role.into(),
        }
    }
}

/// A presence update pushed by the server.
///
/// Internally tagged, so frames look like:
///
/// ```text
/// {"type":"join","userId":"u-1","role":"cashier"}
/// {"type":"leave","userId":"u-1"}
/// {"type":"roster","entries":[{"userId":"u-2","role":"admin"}]}
/// ```
///
/// Any other `type` decodes to [`PresenceEvent::Unknown`] so that newer
/// servers can add event kinds without breaking older clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PresenceEvent {
    /// A user came online (or changed role). Upserts by user id.
    Join(PresenceEntry),

    /// A user went offline.
    Leave {
        #[serde(rename = "userId")]
        user_id: UserId,
    },

    /// Authoritative snapshot that replaces the whole online set.
    Roster { entries: Vec<PresenceEntry> },

    /// An event kind this client doesn't understand.
    #[serde(other)]
    Unknown,
}

impl PresenceEvent {
    /// Checks protocol rules that serde can't express.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] when a user id is empty.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let empty = match self {
            Self::Join(entry) => entry.user_id.as_str().is_empty(),
            Self::Leave { user_id } => user_id.as_str().is_empty(),
            Self::Roster { entries } => {
                entries.iter().any(|e| e.user_id.as_str().is_empty())
            }
            Self::Unknown => false,
        };
        if empty {
            return Err(ProtocolError::InvalidMessage(
                "presence event with empty userId".into(),
            ));
        }
        Ok(())
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::Leave { .. } => "leave",
            Self::Roster { .. } => "roster",
            Self::Unknown => "unknown",
        }
    }
}
