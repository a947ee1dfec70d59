// Transport error type delivered to error observers

use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the socket (TCP, TLS or WebSocket handshake) failed.
    #[error("connect failed: {0}")]
    Connect(#[source] tungstenite::Error),
    /// Reading from or writing to an open socket failed.
    #[error("socket error: {0}")]
    Socket(#[source] tungstenite::Error),
    #[error("encode outbound payload: {0}")]
    Encode(#[from] serde_json::Error),
}
