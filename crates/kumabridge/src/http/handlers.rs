use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde_json::Value;

use kumabridge_core::{GroupSummary, Monitor};

use super::AppState;
use super::error::ApiError;
use super::types::{EmitRequest, HealthResponse, TargetRequest};

/// `POST /emit`: forward one event and return its acknowledgement.
pub async fn emit(
    State(state): State<AppState>,
    body: Result<Json<EmitRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body?;
    let emit = request.validate()?;

    let ack = state
        .bridge
        .emit_with_ack(
            &emit.target.destination,
            &emit.target.credentials,
            &emit.event_name,
            emit.payload,
            emit.timeout,
        )
        .await?;
    Ok(Json(ack.to_value()))
}

/// `POST /monitors`: every cached monitor entity.
pub async fn monitors(
    State(state): State<AppState>,
    body: Result<Json<TargetRequest>, JsonRejection>,
) -> Result<Json<Vec<Monitor>>, ApiError> {
    let Json(request) = body?;
    let target = request.validate()?;

    let monitors = state
        .bridge
        .list_monitors(&target.destination, &target.credentials)
        .await?;
    Ok(Json(monitors))
}

/// `POST /groups`: `{id, name}` of every cached group.
pub async fn groups(
    State(state): State<AppState>,
    body: Result<Json<TargetRequest>, JsonRejection>,
) -> Result<Json<Vec<GroupSummary>>, ApiError> {
    let Json(request) = body?;
    let target = request.validate()?;

    let groups = state
        .bridge
        .list_groups(&target.destination, &target.credentials)
        .await?;
    Ok(Json(groups))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.bridge.connections(),
    })
}
