//! Server error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use kumabridge_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const BIND: i32 = 3;
}

#[derive(Debug, Error, Diagnostic)]
pub enum ServerError {
    #[error("Configuration error")]
    #[diagnostic(
        code(kumabridge::config),
        help(
            "Check the config file and KUMABRIDGE_* environment variables.\n\
             Run: kumabridge --print-config"
        )
    )]
    Config(#[source] ConfigError),

    #[error("Could not listen on {addr}")]
    #[diagnostic(
        code(kumabridge::bind),
        help("Is another process using the port? Choose one with --port or PORT.")
    )]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server failed")]
    #[diagnostic(code(kumabridge::serve))]
    Serve(#[source] std::io::Error),
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl ServerError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => exit_code::CONFIG,
            Self::Bind { .. } => exit_code::BIND,
            Self::Serve(_) => exit_code::GENERAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn exit_codes_by_failure() {
        let config = ServerError::from(ConfigError::MissingFile {
            path: PathBuf::from("none.toml"),
        });
        let bind = ServerError::Bind {
            addr: "0.0.0.0:3000".into(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        let serve = ServerError::Serve(std::io::Error::other("boom"));

        assert_eq!(config.exit_code(), exit_code::CONFIG);
        assert_eq!(bind.exit_code(), exit_code::BIND);
        assert_eq!(serve.exit_code(), exit_code::GENERAL);
    }
}
