//! The signed-in user's profile as stored under the `user` key.
//!
//! Profiles come from several generations of the backend, and the outlet
//! reference in particular has changed shape over time:
//!
//! ```text
//! { "outletId": "X" }            direct field
//! { "outlet": "X" }              bare reference
//! { "outlet": { "id": "X" } }    populated object
//! { "outlet": { "_id": "X" } }   legacy populated object
//! ```
//!
//! Deserialization here is deliberately lenient: a field with an
//! unexpected type is dropped instead of failing the whole profile, so an
//! old stored profile never locks the user out of presence.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A user profile as the backend returns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Backend user id (`id`, or legacy `_id`).
    #[serde(default, alias = "_id", deserialize_with = "lenient_string")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub role: Option<String>,

    #[serde(default)]
    pub is_active: bool,

    /// Direct outlet id field. Takes precedence over [`UserProfile::outlet`].
    #[serde(
        default,
        alias = "outlet_id",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub outlet_id: Option<String>,

    /// Outlet reference in whatever shape the backend sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlet: Option<OutletRef>,
}

/// The polymorphic outlet reference carried by a profile.
///
/// Resolved once, by [`resolve_outlet_id`](crate::resolve_outlet_id);
/// nothing downstream branches on these shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutletRef {
    /// A bare outlet id.
    Id(String),
    /// A populated outlet document.
    Object(OutletObject),
    /// Anything else (numbers, arrays). Never resolves to an outlet.
    Other(Value),
}

impl OutletRef {
    /// Name of the shape, for diagnostics.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Id(_) => "string",
            Self::Object(_) => "object",
            Self::Other(_) => "other",
        }
    }
}

/// A populated outlet document; only the id fields matter here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutletObject {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Legacy document id.
    #[serde(
        rename = "_id",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub legacy_id: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Accepts any JSON value and keeps it only if it is a string.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}
