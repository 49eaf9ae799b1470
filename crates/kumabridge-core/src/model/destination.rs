use std::fmt;

use url::Url;

use crate::error::CoreError;

/// Address of a remote server; the connection registry key.
///
/// Two requests naming the same destination string share one connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    raw: String,
    url: Url,
}

impl Destination {
    /// Validate a destination string.
    ///
    /// Accepts `http`, `https`, `ws` and `wss` URLs.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if raw.trim().is_empty() {
            return Err(CoreError::validation("destination must not be empty"));
        }
        let url = Url::parse(raw)
            .map_err(|e| CoreError::validation(format!("invalid destination '{raw}': {e}")))?;
        kumabridge_api::transport::socket_url(&url)?;
        Ok(Self {
            raw: raw.to_owned(),
            url,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_ws() {
        for raw in ["http://kuma:3001", "https://kuma.example.com", "ws://h/", "wss://h/x"] {
            let dest = Destination::parse(raw).unwrap();
            assert_eq!(dest.as_str(), raw);
        }
    }

    #[test]
    fn rejects_garbage_and_other_schemes() {
        for raw in ["", "   ", "not a url", "ftp://h/"] {
            assert!(
                matches!(Destination::parse(raw), Err(CoreError::Validation { .. })),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn equality_is_by_string() {
        let a = Destination::parse("http://h:1").unwrap();
        let b = Destination::parse("http://h:1").unwrap();
        assert_eq!(a, b);
    }
}
