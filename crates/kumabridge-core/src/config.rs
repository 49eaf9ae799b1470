// ── Runtime bridge settings ──
//
// How the bridge talks to upstream servers: deadlines and reconnect
// policy. Never touches disk; `kumabridge-config` builds one from the
// layered configuration and hands it in.

use std::time::Duration;

use kumabridge_api::ReconnectConfig;
use secrecy::SecretString;

/// Login credentials for one destination.
///
/// Only used while establishing a connection (and for re-login when the
/// server re-issues its challenge on that connection).
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// Tuning for every connection a [`Bridge`](crate::Bridge) opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Default deadline for `emit_with_ack` when the caller gives none.
    pub ack_timeout: Duration,
    /// How long to wait after connect for a login challenge before
    /// treating the server as open.
    pub login_grace: Duration,
    /// Upper bound on connect + login.
    pub connect_timeout: Duration,
    /// Reconnect policy for established connections.
    pub reconnect: ReconnectConfig,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(5000),
            login_grace: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
        }
    }
}
