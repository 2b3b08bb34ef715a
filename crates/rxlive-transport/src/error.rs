/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint URL or request could not be built.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Opening the connection failed (refused, handshake rejected, DNS).
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The server closed the connection with an error code.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Closing the connection failed.
    #[error("close failed: {0}")]
    CloseFailed(#[source] std::io::Error),
}
