// ── Core error types ──
//
// Errors a bridge consumer (the HTTP layer) sees. Socket.IO transport
// errors never leak out raw: the `From<kumabridge_api::Error>` impl maps
// them onto the bridge taxonomy.

use serde_json::Value;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Request errors ───────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── Connection errors ────────────────────────────────────────────
    /// The connection exists but is not currently connected.
    #[error("Socket not connected")]
    TransportUnavailable,

    /// The server rejected the login handshake.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The connection could not be established or failed mid-handshake.
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    // ── Acknowledgement errors ───────────────────────────────────────
    #[error("No acknowledgement for '{event_name}' within {timeout_ms}ms")]
    AckTimeout { event_name: String, timeout_ms: u64 },

    /// The server acknowledged with `ok: false`. Carries the full ack.
    #[error("Remote rejected the request")]
    RemoteRejected { ack: Value },

    /// The acknowledgement was not an object with a boolean `ok`.
    #[error("Malformed acknowledgement: {message}")]
    MalformedAck { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<kumabridge_api::Error> for CoreError {
    fn from(err: kumabridge_api::Error) -> Self {
        use kumabridge_api::Error as ApiError;

        match err {
            e if e.is_unavailable() => CoreError::TransportUnavailable,
            ApiError::InvalidUrl(e) => CoreError::validation(format!("invalid destination: {e}")),
            ApiError::UnsupportedScheme(scheme) => CoreError::validation(format!(
                "unsupported destination scheme '{scheme}' (expected http, https, ws or wss)"
            )),
            ApiError::ConnectRejected { message } => CoreError::Authentication { message },
            ApiError::Serialization(e) => CoreError::Internal(format!("serialization error: {e}")),
            other => CoreError::transport(other.to_string()),
        }
    }
}
