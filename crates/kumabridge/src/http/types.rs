// ── Request and response bodies ──
//
// Every request field is optional at the serde level so that missing
// fields can be reported together, before any connection attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use kumabridge_core::{ConnectionInfo, Credentials, Destination};

use super::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct CredentialsBody {
    #[serde(default, alias = "u")]
    pub username: Option<String>,

    #[serde(default, alias = "p")]
    pub password: Option<String>,
}

/// Body of `POST /monitors` and `POST /groups`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRequest {
    #[serde(default)]
    pub destination: Option<String>,

    #[serde(default)]
    pub credentials: Option<CredentialsBody>,
}

/// Body of `POST /emit`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitRequest {
    #[serde(default)]
    pub destination: Option<String>,

    #[serde(default)]
    pub credentials: Option<CredentialsBody>,

    #[serde(default)]
    pub event_name: Option<String>,

    /// `null` counts as missing.
    #[serde(default)]
    pub payload: Option<Value>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// A destination and credentials that passed validation.
#[derive(Debug)]
pub struct Target {
    pub destination: Destination,
    pub credentials: Credentials,
}

/// A validated `/emit` request.
#[derive(Debug)]
pub struct Emit {
    pub target: Target,
    pub event_name: String,
    pub payload: Value,
    pub timeout: Option<Duration>,
}

impl TargetRequest {
    pub fn validate(self) -> Result<Target, ApiError> {
        let mut missing = Vec::new();
        let target = validate_target(self.destination, self.credentials, &mut missing);
        if !missing.is_empty() {
            return Err(ApiError::missing_fields(missing));
        }
        target
    }
}

impl EmitRequest {
    pub fn validate(self) -> Result<Emit, ApiError> {
        let mut missing = Vec::new();
        let target = validate_target(self.destination, self.credentials, &mut missing);
        let event_name = non_empty(self.event_name);
        if event_name.is_none() {
            missing.push("eventName");
        }
        if self.payload.is_none() {
            missing.push("payload");
        }
        if !missing.is_empty() {
            return Err(ApiError::missing_fields(missing));
        }
        if self.timeout_ms == Some(0) {
            return Err(ApiError::bad_request("timeoutMs must be greater than zero"));
        }

        Ok(Emit {
            target: target?,
            event_name: event_name.unwrap_or_default(),
            payload: self.payload.unwrap_or(Value::Null),
            timeout: self.timeout_ms.map(Duration::from_millis),
        })
    }
}

fn validate_target(
    destination: Option<String>,
    credentials: Option<CredentialsBody>,
    missing: &mut Vec<&'static str>,
) -> Result<Target, ApiError> {
    let destination = non_empty(destination);
    if destination.is_none() {
        missing.push("destination");
    }
    let credentials = credentials.unwrap_or_default();
    let username = non_empty(credentials.username);
    if username.is_none() {
        missing.push("credentials.username");
    }
    let password = non_empty(credentials.password);
    if password.is_none() {
        missing.push("credentials.password");
    }

    let (Some(destination), Some(username), Some(password)) = (destination, username, password)
    else {
        return Err(ApiError::bad_request("Missing required fields"));
    };
    Ok(Target {
        destination: Destination::parse(&destination)?,
        credentials: Credentials::new(username, password),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ── Responses ───────────────────────────────────────────────────────

/// Uniform error body. Every failure carries `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<Value>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
            missing: Vec::new(),
            event_name: None,
            ack: None,
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: Vec<ConnectionInfo>,
}
