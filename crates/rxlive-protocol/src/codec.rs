//! Codec trait and implementations for presence frames.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The presence client doesn't care HOW frames are serialized, it only
//! needs something that implements [`Codec`]. Servers that speak JSON
//! text frames use [`JsonCodec`].

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the codec lives inside the presence
/// actor task for as long as the channel runs.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use rxlive_protocol::{Codec, JsonCodec, PresenceEvent, UserId};
///
/// let codec = JsonCodec;
/// let event: PresenceEvent = codec
///     .decode(br#"{"type":"leave","userId":"u-1"}"#)
///     .unwrap();
/// assert_eq!(event, PresenceEvent::Leave { user_id: UserId::new("u-1") });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{PresenceEntry, PresenceEvent, UserId};

    #[test]
    fn test_decode_malformed_json_is_decode_error() {
        let result: Result<PresenceEvent, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_uses_wire_field_names() {
        let event = PresenceEvent::Join(PresenceEntry::new("u-1", "cashier"));
        let bytes = JsonCodec.encode(&event).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "join", "userId": "u-1", "role": "cashier"})
        );
    }

    #[test]
    fn test_decode_roster_frame() {
        let frame = br#"{"type":"roster","entries":[{"userId":"c","role":"admin"},{"userId":"d","role":"staff"}]}"#;
        let event: PresenceEvent = JsonCodec.decode(frame).unwrap();
        assert_eq!(
            event,
            PresenceEvent::Roster {
                entries: vec![
                    PresenceEntry::new("c", "admin"),
                    PresenceEntry::new("d", "staff"),
                ]
            }
        );
        assert_eq!(
            JsonCodec.decode::<UserId>(br#""x""#).unwrap(),
            UserId::new("x")
        );
    }
}
