//! Configuration for the kumabridge server.
//!
//! Layered loading with figment: built-in defaults, then a TOML file,
//! then `KUMABRIDGE_*` environment variables, then the conventional
//! `PORT` variable. Translates the bridge section into
//! `kumabridge_core::BridgeSettings`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kumabridge_core::{BridgeSettings, ReconnectConfig};

/// Prefix for environment overrides. Nested keys use `__`, e.g.
/// `KUMABRIDGE_BRIDGE__ACK_TIMEOUT_MS=2000`.
pub const ENV_PREFIX: &str = "KUMABRIDGE_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config structs ──────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub bridge: BridgeTuning,

    #[serde(default)]
    pub log: LogConfig,
}

/// HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}

/// Upstream connection tuning, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeTuning {
    /// Default acknowledgement deadline for `/emit`.
    pub ack_timeout_ms: u64,

    /// Wait after connect for a login challenge before treating the
    /// server as open.
    pub login_grace_ms: u64,

    /// Upper bound on connect + login.
    pub connect_timeout_ms: u64,

    pub reconnect_initial_delay_ms: u64,

    pub reconnect_max_delay_ms: u64,

    /// Unset means retry forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_max_retries: Option<u32>,
}

impl Default for BridgeTuning {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5000,
            login_grace_ms: 500,
            connect_timeout_ms: 10_000,
            reconnect_initial_delay_ms: 1000,
            reconnect_max_delay_ms: 30_000,
            reconnect_max_retries: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Log output format.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, colored when attached to a terminal.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl Config {
    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bridge = &self.bridge;
        for (field, value) in [
            ("bridge.ack_timeout_ms", bridge.ack_timeout_ms),
            ("bridge.connect_timeout_ms", bridge.connect_timeout_ms),
            ("bridge.reconnect_initial_delay_ms", bridge.reconnect_initial_delay_ms),
            ("bridge.reconnect_max_delay_ms", bridge.reconnect_max_delay_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation {
                    field: field.into(),
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if bridge.reconnect_max_delay_ms < bridge.reconnect_initial_delay_ms {
            return Err(ConfigError::Validation {
                field: "bridge.reconnect_max_delay_ms".into(),
                reason: "must not be smaller than bridge.reconnect_initial_delay_ms".into(),
            });
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "server.host".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Settings handed to `kumabridge_core::Bridge`.
    pub fn bridge_settings(&self) -> BridgeSettings {
        let b = &self.bridge;
        BridgeSettings {
            ack_timeout: Duration::from_millis(b.ack_timeout_ms),
            login_grace: Duration::from_millis(b.login_grace_ms),
            connect_timeout: Duration::from_millis(b.connect_timeout_ms),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(b.reconnect_initial_delay_ms),
                max_delay: Duration::from_millis(b.reconnect_max_delay_ms),
                max_retries: b.reconnect_max_retries,
            },
        }
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Default config file location via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "kumabridge", "kumabridge").map_or_else(
        || PathBuf::from("kumabridge.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// The layered figment for `path` (or the default location).
pub fn figment(path: Option<&Path>) -> Figment {
    let path = path.map_or_else(config_path, Path::to_path_buf);

    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
}

/// Load and validate the configuration.
///
/// An explicitly given `path` must exist; the default location is
/// optional.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::MissingFile {
                path: path.to_path_buf(),
            });
        }
    }

    let config: Config = figment(path).extract()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    fn load(jail_path: &str) -> figment::error::Result<Config> {
        load_config(Some(Path::new(jail_path))).map_err(|e| e.to_string().into())
    }

    #[test]
    fn defaults_without_file_or_env() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let config: Config = figment(Some(Path::new("absent.toml"))).extract()?;
            assert_eq!(config, Config::default());
            assert_eq!(config.bind_address(), "0.0.0.0:3000");
            assert_eq!(config.log.format, LogFormat::Pretty);
            Ok(())
        });
    }

    #[test]
    fn file_then_env_then_port() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "kumabridge.toml",
                r#"
                [server]
                host = "127.0.0.1"
                port = 4000

                [bridge]
                ack_timeout_ms = 1500
                reconnect_max_retries = 3

                [log]
                format = "json"
                "#,
            )?;
            jail.set_env("KUMABRIDGE_BRIDGE__LOGIN_GRACE_MS", "250");
            jail.set_env("PORT", "8080");

            let config = load("kumabridge.toml")?;
            assert_eq!(config.server.host, "127.0.0.1");
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.bridge.ack_timeout_ms, 1500);
            assert_eq!(config.bridge.login_grace_ms, 250);
            assert_eq!(config.bridge.connect_timeout_ms, 10_000);
            assert_eq!(config.bridge.reconnect_max_retries, Some(3));
            assert_eq!(config.log.format, LogFormat::Json);
            Ok(())
        });
    }

    #[test]
    fn prefixed_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("kumabridge.toml", "[server]\nport = 4000\n")?;
            jail.set_env("KUMABRIDGE_SERVER__PORT", "5000");

            assert_eq!(load("kumabridge.toml")?.server.port, 5000);
            Ok(())
        });
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("kumabridge.toml", "[log]\nformat = \"xml\"\n")?;
            let err = load_config(Some(Path::new("kumabridge.toml"))).unwrap_err();
            assert!(matches!(err, ConfigError::Figment(_)));
            Ok(())
        });
    }

    #[test]
    fn zero_timeouts_fail_validation() {
        let mut config = Config::default();
        config.bridge.ack_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bridge.ack_timeout_ms"));

        let mut config = Config::default();
        config.bridge.reconnect_max_delay_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bridge_settings_convert_milliseconds() {
        let mut config = Config::default();
        config.bridge.reconnect_max_retries = Some(2);
        let settings = config.bridge_settings();

        assert_eq!(settings.ack_timeout, Duration::from_secs(5));
        assert_eq!(settings.login_grace, Duration::from_millis(500));
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        assert_eq!(settings.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(settings.reconnect.max_delay, Duration::from_secs(30));
        assert_eq!(settings.reconnect.max_retries, Some(2));
        assert_eq!(BridgeSettings::default().ack_timeout, settings.ack_timeout);
    }

    #[test]
    fn renders_as_toml() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[server]"));
        assert!(rendered.contains("port = 3000"));
        assert!(rendered.contains("format = \"pretty\""));
    }
}
