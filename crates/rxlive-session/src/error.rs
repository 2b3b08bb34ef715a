//! Error types for the session layer.

/// Why a token can't be used.
///
/// These never escape the validator as failures of the caller's
/// operation: [`is_valid`](crate::is_valid) folds them into `false`, and
/// only [`check`](crate::check) hands them out for callers that want the
/// reason (diagnostics, logging).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The token is not exactly three `.`-separated segments.
    #[error("malformed token: expected 3 segments, found {segments}")]
    MalformedToken { segments: usize },

    /// The middle segment did not decode to a JSON object.
    #[error("unparsable claims: {0}")]
    UnparsableClaims(String),

    /// The token carries an expiry that is not in the future.
    #[error("token expired at {expired_at}")]
    ExpiredToken { expired_at: i64 },
}

/// Errors from the durable key-value storage behind the credential store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage medium could not be read or written.
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    /// The stored document is not the JSON shape we expect.
    #[error("storage corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
