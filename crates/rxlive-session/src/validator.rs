//! Token validation: pure functions of `(token, now)`.
//!
//! A token here is the familiar `header.payload.signature` shape. The
//! validator never verifies the signature (the server does that on every
//! request); it only answers "is this credential still worth presenting?"
//! so the client doesn't open channels or fetch outlet data with a token
//! that is obviously dead.
//!
//! Nothing in this module reads the clock or touches storage. Callers pass
//! `now` as Unix seconds, which keeps every rule testable with fixed times.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::Value;

use crate::{Claims, TokenError};

/// Decodes a token's claims without judging expiry.
///
/// The payload segment is base64url; padding and the standard alphabet
/// are tolerated because some issuers emit them.
///
/// # Errors
/// - [`TokenError::MalformedToken`]: not exactly three `.`-separated segments
/// - [`TokenError::UnparsableClaims`]: payload is not base64 of a JSON object
pub fn decode(token: &str) -> Result<Claims, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(TokenError::MalformedToken {
            segments: segments.len(),
        });
    };

    let bytes = decode_segment(payload).ok_or_else(|| {
        TokenError::UnparsableClaims("payload is not base64".into())
    })?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(Claims::from_map(map)),
        Ok(_) => Err(TokenError::UnparsableClaims(
            "payload is not a JSON object".into(),
        )),
        Err(e) => Err(TokenError::UnparsableClaims(e.to_string())),
    }
}

/// Decodes a token and rejects it if it has expired at `now`.
///
/// # Errors
/// Everything [`decode`] returns, plus [`TokenError::ExpiredToken`] when
/// the `exp` claim is at or before `now`.
pub fn check(token: &str, now: i64) -> Result<Claims, TokenError> {
    let claims = decode(token)?;
    match claims.expires_at {
        Some(exp) if exp <= now => Err(TokenError::ExpiredToken { expired_at: exp }),
        _ => Ok(claims),
    }
}

/// `true` if the token decodes and has not expired at `now`.
///
/// Tokens without an `exp` claim are treated as non-expiring.
pub fn is_valid(token: &str, now: i64) -> bool {
    check(token, now).is_ok()
}

/// The current wall-clock time in Unix seconds.
///
/// The one impure helper in this module, kept separate so the rules above
/// stay pure. A clock before 1970 reads as 0.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let trimmed = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    /// Builds an unsigned token around the given claims.
    fn token(claims: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.signature")
    }

    // =====================================================================
    // decode()
    // =====================================================================

    #[test]
    fn test_decode_wrong_segment_count_is_malformed() {
        for bad in ["", "abc", "a.b", "a.b.c.d"] {
            assert!(
                matches!(decode(bad), Err(TokenError::MalformedToken { .. })),
                "{bad:?} should be malformed"
            );
        }
        assert_eq!(
            decode("a.b"),
            Err(TokenError::MalformedToken { segments: 2 })
        );
    }

    #[test]
    fn test_decode_non_base64_payload_is_unparsable() {
        assert!(matches!(
            decode("h.!!!.s"),
            Err(TokenError::UnparsableClaims(_))
        ));
    }

    #[test]
    fn test_decode_non_json_payload_is_unparsable() {
        let payload = URL_SAFE_NO_PAD.encode("not json");
        assert!(matches!(
            decode(&format!("h.{payload}.s")),
            Err(TokenError::UnparsableClaims(_))
        ));
    }

    #[test]
    fn test_decode_json_array_payload_is_unparsable() {
        let payload = URL_SAFE_NO_PAD.encode("[1,2]");
        assert!(matches!(
            decode(&format!("h.{payload}.s")),
            Err(TokenError::UnparsableClaims(_))
        ));
    }

    #[test]
    fn test_decode_tolerates_padding_and_standard_alphabet() {
        let claims = json!({"sub": "u?>"}).to_string();
        let padded = base64::engine::general_purpose::STANDARD.encode(&claims);
        let decoded = decode(&format!("h.{padded}.s")).expect("should decode");
        assert_eq!(decoded.subject.as_deref(), Some("u?>"));
    }

    #[test]
    fn test_decode_reads_claims() {
        let claims = decode(&token(json!({"sub": "u-1", "exp": NOW + 60}))).unwrap();
        assert_eq!(claims.subject.as_deref(), Some("u-1"));
        assert_eq!(claims.expires_at, Some(NOW + 60));
    }

    // =====================================================================
    // is_valid() / check()
    // =====================================================================

    #[test]
    fn test_is_valid_false_for_missing_separators() {
        assert!(!is_valid("headerpayloadsig", NOW));
        assert!(!is_valid("header.payloadsig", NOW));
    }

    #[test]
    fn test_is_valid_expiry_boundaries() {
        assert!(!is_valid(&token(json!({"exp": NOW - 1})), NOW));
        assert!(is_valid(&token(json!({"exp": NOW + 1})), NOW));
        // Exact equality counts as expired.
        assert!(!is_valid(&token(json!({"exp": NOW})), NOW));
    }

    #[test]
    fn test_is_valid_without_exp_never_expires() {
        assert!(is_valid(&token(json!({"sub": "service"})), i64::MAX));
    }

    #[test]
    fn test_check_reports_expiry() {
        assert_eq!(
            check(&token(json!({"exp": NOW - 5})), NOW),
            Err(TokenError::ExpiredToken { expired_at: NOW - 5 })
        );
    }

    #[test]
    fn test_now_unix_is_after_2020() {
        assert!(now_unix() > 1_577_836_800);
    }
}
