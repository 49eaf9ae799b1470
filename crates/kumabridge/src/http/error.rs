//! HTTP error responses.
//!
//! Couples a status code with an [`ErrorBody`] and maps bridge errors
//! onto the status taxonomy the endpoints promise.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use kumabridge_core::CoreError;

use super::types::ErrorBody;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::new(error),
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn missing_fields(missing: Vec<&str>) -> Self {
        let mut err = Self::bad_request("Missing required fields");
        err.body.missing = missing.into_iter().map(str::to_owned).collect();
        err
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.body.message = Some(message.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("Invalid JSON body").with_message(rejection.body_text())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { message } => Self::bad_request(message),
            CoreError::TransportUnavailable => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Socket not connected")
            }
            CoreError::Authentication { message } => {
                Self::new(StatusCode::UNAUTHORIZED, "Login failed").with_message(message)
            }
            CoreError::Transport { reason } => {
                Self::new(StatusCode::BAD_GATEWAY, "Transport error").with_message(reason)
            }
            CoreError::AckTimeout { event_name, .. } => {
                let mut err = Self::new(StatusCode::GATEWAY_TIMEOUT, "ACK timeout");
                err.body.event_name = Some(event_name);
                err
            }
            CoreError::RemoteRejected { ack } => {
                let mut err = Self::bad_request("Remote rejected");
                err.body.ack = Some(ack);
                err
            }
            CoreError::MalformedAck { message } => {
                Self::new(StatusCode::BAD_GATEWAY, "Malformed ACK").with_message(message)
            }
            err @ CoreError::Internal(_) => {
                tracing::error!(error = %err, "Internal error while handling request");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        }
    }
}
