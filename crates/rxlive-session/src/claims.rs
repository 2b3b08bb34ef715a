//! Decoded token claims.

use serde_json::{Map, Value};

/// The claims carried in a token's middle segment.
///
/// Only the fields the session layer acts on are lifted out; everything
/// the token carried stays available in [`Claims::raw`].
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    /// Who the token was issued to (`sub`, falling back to `userId`/`id`).
    pub subject: Option<String>,

    /// `iat` in Unix seconds, if present and numeric.
    pub issued_at: Option<i64>,

    /// `exp` in Unix seconds, if present and numeric.
    ///
    /// Fractional expiries are rounded up: a token with `exp = 100.5` is
    /// still usable at `now = 100`.
    pub expires_at: Option<i64>,

    /// Every claim as it appeared in the token.
    pub raw: Map<String, Value>,
}

impl Claims {
    /// Lifts the known claims out of a decoded JSON object.
    pub fn from_map(raw: Map<String, Value>) -> Self {
        let subject = ["sub", "userId", "id"]
            .iter()
            .find_map(|key| raw.get(*key).and_then(Value::as_str))
            .map(str::to_string);
        let issued_at = raw.get("iat").and_then(Value::as_f64).map(|t| t.floor() as i64);
        let expires_at = raw.get("exp").and_then(Value::as_f64).map(|t| t.ceil() as i64);

        Self {
            subject,
            issued_at,
            expires_at,
            raw,
        }
    }

    /// `true` when an expiry exists and `now` has reached it.
    ///
    /// Reaching the expiry exactly counts as expired. A token without
    /// `exp` never expires.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Seconds left before expiry, or `None` for non-expiring tokens.
    /// Negative once expired.
    pub fn remaining_at(&self, now: i64) -> Option<i64> {
        self.expires_at.map(|exp| exp - now)
    }

    /// Names of all claims present, sorted.
    pub fn claim_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.raw.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Claims {
        match value {
            Value::Object(map) => Claims::from_map(map),
            _ => panic!("test claims must be an object"),
        }
    }

    #[test]
    fn test_from_map_lifts_standard_claims() {
        let c = claims(json!({"sub": "u-1", "iat": 100, "exp": 200, "role": "admin"}));
        assert_eq!(c.subject.as_deref(), Some("u-1"));
        assert_eq!(c.issued_at, Some(100));
        assert_eq!(c.expires_at, Some(200));
        assert_eq!(c.claim_names(), vec!["exp", "iat", "role", "sub"]);
    }

    #[test]
    fn test_subject_falls_back_to_user_id() {
        let c = claims(json!({"userId": "u-2"}));
        assert_eq!(c.subject.as_deref(), Some("u-2"));
    }

    #[test]
    fn test_non_numeric_exp_is_ignored() {
        let c = claims(json!({"exp": "tomorrow"}));
        assert_eq!(c.expires_at, None);
        assert!(!c.is_expired_at(i64::MAX));
    }

    #[test]
    fn test_fractional_exp_rounds_up() {
        let c = claims(json!({"exp": 100.5}));
        assert_eq!(c.expires_at, Some(101));
        assert!(!c.is_expired_at(100));
        assert!(c.is_expired_at(101));
    }

    #[test]
    fn test_remaining_at() {
        let c = claims(json!({"exp": 150}));
        assert_eq!(c.remaining_at(100), Some(50));
        assert_eq!(c.remaining_at(160), Some(-10));
        assert_eq!(claims(json!({})).remaining_at(100), None);
    }
}
