// Shared transport settings for Socket.IO connections.
//
// Endpoint derivation from a destination address and the reconnect
// backoff policy used by the client's background loop.

use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Engine.IO protocol revision spoken by this client.
pub const ENGINE_IO_VERSION: &str = "4";

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for Socket.IO reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── Endpoint ─────────────────────────────────────────────────────────

/// Derive the Socket.IO WebSocket endpoint for a destination.
///
/// `http`/`ws` map to `ws`, `https`/`wss` map to `wss`. The
/// `/socket.io/` path is appended to whatever path the destination
/// carries (so servers behind a path prefix work), and the query is
/// replaced with the Engine.IO transport parameters.
pub fn socket_url(destination: &Url) -> Result<Url, Error> {
    let scheme = match destination.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::UnsupportedScheme(other.to_owned())),
    };

    let mut url = destination.clone();
    url.set_scheme(scheme)
        .map_err(|()| Error::UnsupportedScheme(scheme.to_owned()))?;

    let base = destination.path().trim_end_matches('/');
    let path = if base.ends_with("/socket.io") {
        format!("{base}/")
    } else {
        format!("{base}/socket.io/")
    };
    url.set_path(&path);
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", ENGINE_IO_VERSION)
        .append_pair("transport", "websocket");

    Ok(url)
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms when many
/// destinations drop at once.
pub(crate) fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
