//! On-demand session diagnostics.
//!
//! [`diagnose`] reads storage, decodes what it finds and returns a
//! [`SessionReport`]. It never writes, and the raw token never appears in
//! the report: only its length and the claims derived from it.

use std::fmt;

use rxlive_protocol::OutletId;
use serde::Serialize;

use crate::{
    decode, now_unix, resolve_outlet_id, CredentialStore, KeyValueStore, UserProfile,
    AUTH_TOKEN_KEY, USER_KEY,
};

/// Whether storage could be read at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StorageStatus {
    Available,
    Unavailable { reason: String },
}

/// What the stored token looks like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TokenSummary {
    /// Storage couldn't be read.
    Unavailable,
    /// No token stored.
    Absent,
    /// A token is stored but its claims can't be decoded.
    Undecodable { length: usize, reason: String },
    /// A decodable token.
    Present {
        length: usize,
        subject: Option<String>,
        issued_at: Option<i64>,
        expires_at: Option<i64>,
        /// Seconds until expiry (negative once expired); `None` if the
        /// token has no expiry.
        remaining_secs: Option<i64>,
        valid: bool,
        claims: Vec<String>,
    },
}

/// What the stored profile looks like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProfileSummary {
    Unavailable,
    Absent,
    Unparsable { reason: String },
    Present {
        id: Option<String>,
        email: Option<String>,
        role: Option<String>,
        is_active: bool,
        /// `"string"`, `"object"`, `"other"`, or `"none"`.
        outlet_shape: &'static str,
        has_outlet_id_field: bool,
        resolved_outlet: Option<OutletId>,
    },
}

/// A side-effect-free snapshot of session state for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// The `now` the report was computed for (Unix seconds).
    pub generated_at: i64,
    pub storage: StorageStatus,
    pub token: TokenSummary,
    pub profile: ProfileSummary,
}

impl SessionReport {
    /// `true` if the stored token is present, decodable and unexpired.
    pub fn session_valid(&self) -> bool {
        matches!(self.token, TokenSummary::Present { valid: true, .. })
    }

    /// Writes the report to the log as one structured event.
    pub fn emit(&self) {
        let (token_len, expires_at, remaining_secs) = match &self.token {
            TokenSummary::Present {
                length,
                expires_at,
                remaining_secs,
                ..
            } => (Some(*length), *expires_at, *remaining_secs),
            TokenSummary::Undecodable { length, .. } => (Some(*length), None, None),
            _ => (None, None, None),
        };
        let resolved_outlet = match &self.profile {
            ProfileSummary::Present {
                resolved_outlet, ..
            } => resolved_outlet.as_ref().map(OutletId::to_string),
            _ => None,
        };
        tracing::info!(
            storage = ?self.storage,
            session_valid = self.session_valid(),
            token_len = ?token_len,
            expires_at = ?expires_at,
            remaining_secs = ?remaining_secs,
            outlet = ?resolved_outlet,
            "session report"
        );
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.storage {
            StorageStatus::Available => writeln!(f, "storage: available")?,
            StorageStatus::Unavailable { reason } => {
                writeln!(f, "storage: unavailable ({reason})")?
            }
        }

        match &self.token {
            TokenSummary::Unavailable => writeln!(f, "token: unavailable")?,
            TokenSummary::Absent => writeln!(f, "token: none")?,
            TokenSummary::Undecodable { length, reason } => {
                writeln!(f, "token: {length} chars, undecodable ({reason})")?
            }
            TokenSummary::Present {
                length,
                subject,
                remaining_secs,
                valid,
                claims,
                ..
            } => {
                let remaining = match remaining_secs {
                    Some(secs) if *secs > 0 => format!("{secs}s remaining"),
                    Some(secs) => format!("expired {}s ago", -secs),
                    None => "no expiry".to_string(),
                };
                writeln!(
                    f,
                    "token: {length} chars, subject {}, {remaining}, {}",
                    subject.as_deref().unwrap_or("-"),
                    if *valid { "valid" } else { "invalid" }
                )?;
                writeln!(f, "claims: {}", claims.join(", "))?;
            }
        }

        match &self.profile {
            ProfileSummary::Unavailable => write!(f, "profile: unavailable"),
            ProfileSummary::Absent => write!(f, "profile: none"),
            ProfileSummary::Unparsable { reason } => {
                write!(f, "profile: unparsable ({reason})")
            }
            ProfileSummary::Present {
                id,
                role,
                is_active,
                outlet_shape,
                resolved_outlet,
                ..
            } => write!(
                f,
                "profile: id {}, role {}, active {is_active}, outlet ref {outlet_shape}, outlet {}",
                id.as_deref().unwrap_or("-"),
                role.as_deref().unwrap_or("-"),
                resolved_outlet
                    .as_ref()
                    .map_or_else(|| "-".to_string(), OutletId::to_string)
            ),
        }
    }
}

/// Builds a [`SessionReport`] from durable storage as of `now`.
///
/// Storage failures don't fail the call; they show up as
/// [`StorageStatus::Unavailable`] with the affected sections marked
/// unavailable.
pub fn diagnose(backend: &dyn KeyValueStore, now: i64) -> SessionReport {
    let mut storage = StorageStatus::Available;

    let token = match backend.get(AUTH_TOKEN_KEY) {
        Ok(Some(raw)) if !raw.is_empty() => summarize_token(&raw, now),
        Ok(_) => TokenSummary::Absent,
        Err(e) => {
            storage = StorageStatus::Unavailable {
                reason: e.to_string(),
            };
            TokenSummary::Unavailable
        }
    };

    let profile = match backend.get(USER_KEY) {
        Ok(Some(raw)) => match serde_json::from_str::<UserProfile>(&raw) {
            Ok(profile) => summarize_profile(&profile),
            Err(e) => ProfileSummary::Unparsable {
                reason: e.to_string(),
            },
        },
        Ok(None) => ProfileSummary::Absent,
        Err(e) => {
            storage = StorageStatus::Unavailable {
                reason: e.to_string(),
            };
            ProfileSummary::Unavailable
        }
    };

    SessionReport {
        generated_at: now,
        storage,
        token,
        profile,
    }
}

impl CredentialStore {
    /// Diagnoses the persisted session as of the current wall-clock time.
    pub fn diagnose(&self) -> SessionReport {
        diagnose(self.backend(), now_unix())
    }
}

fn summarize_token(raw: &str, now: i64) -> TokenSummary {
    let length = raw.len();
    match decode(raw) {
        Ok(claims) => TokenSummary::Present {
            length,
            valid: !claims.is_expired_at(now),
            subject: claims.subject.clone(),
            issued_at: claims.issued_at,
            expires_at: claims.expires_at,
            remaining_secs: claims.remaining_at(now),
            claims: claims.claim_names(),
        },
        Err(e) => TokenSummary::Undecodable {
            length,
            reason: e.to_string(),
        },
    }
}

fn summarize_profile(profile: &UserProfile) -> ProfileSummary {
    ProfileSummary::Present {
        id: profile.id.clone(),
        email: profile.email.clone(),
        role: profile.role.clone(),
        is_active: profile.is_active,
        outlet_shape: profile.outlet.as_ref().map_or("none", |r| r.shape()),
        has_outlet_id_field: profile.outlet_id.is_some(),
        resolved_outlet: resolve_outlet_id(profile),
    }
}
