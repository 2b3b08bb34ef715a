//! Outlet resolution: profile in, canonical [`OutletId`] out.

use rxlive_protocol::OutletId;

use crate::{CredentialStore, OutletRef, UserProfile};

/// Resolves the outlet a profile is scoped to.
///
/// Precedence, first non-empty match wins:
///
/// 1. the direct `outletId` field
/// 2. `outlet` when it is a bare string
/// 3. `outlet.id`
/// 4. `outlet._id`
///
/// Returns `None` when none of them is present. That is a normal state
/// ("no presence scope"), not an error.
pub fn resolve_outlet_id(profile: &UserProfile) -> Option<OutletId> {
    let from_ref = || match profile.outlet.as_ref()? {
        OutletRef::Id(id) => non_empty(Some(id)),
        OutletRef::Object(obj) => {
            non_empty(obj.id.as_ref()).or_else(|| non_empty(obj.legacy_id.as_ref()))
        }
        OutletRef::Other(_) => None,
    };

    non_empty(profile.outlet_id.as_ref())
        .or_else(from_ref)
        .map(OutletId::new)
}

/// Resolves from `profile`, or from the last profile written to durable
/// storage when no in-memory profile is available yet (cold start).
///
/// Storage failures resolve to `None`; they are logged, never raised.
pub fn resolve_outlet_id_or_stored(
    profile: Option<&UserProfile>,
    store: &CredentialStore,
) -> Option<OutletId> {
    if let Some(profile) = profile {
        return resolve_outlet_id(profile);
    }

    match store.stored_profile() {
        Ok(Some(stored)) => {
            let outlet = resolve_outlet_id(&stored);
            tracing::debug!(outlet = ?outlet, "resolved outlet from stored profile");
            outlet
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "stored profile unavailable, no outlet scope");
            None
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}
