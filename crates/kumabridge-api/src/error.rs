use thiserror::Error;

/// Top-level error type for the `kumabridge-api` crate.
///
/// Covers every failure mode of the Socket.IO transport: addressing,
/// the WebSocket itself, the Engine.IO/Socket.IO handshake, and
/// acknowledgement delivery. `kumabridge-core` maps these into
/// bridge-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Addressing ──────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The destination scheme cannot carry a Socket.IO connection.
    #[error("Unsupported URL scheme '{0}' (expected http, https, ws or wss)")]
    UnsupportedScheme(String),

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed or errored mid-stream.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed while a response was still expected.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Socket.IO ───────────────────────────────────────────────────
    /// The peer sent something that is not valid Engine.IO / Socket.IO.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server answered the namespace connect with a connect error.
    #[error("Connection rejected by server: {message}")]
    ConnectRejected { message: String },

    /// No ping from the server within `pingInterval + pingTimeout`.
    #[error("No ping from server within {timeout_ms}ms")]
    PingTimeout { timeout_ms: u64 },

    /// The client is not in the connected state.
    #[error("Socket is not connected")]
    NotConnected,

    /// The session ended while an acknowledgement was outstanding.
    #[error("Disconnected: {reason}")]
    Disconnected { reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if the connection is (currently) unusable but may
    /// come back through the reconnect loop.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Disconnected { .. })
    }
}
