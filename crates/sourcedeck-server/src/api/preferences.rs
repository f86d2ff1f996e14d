//! Local preference endpoints.
//!
//! Writes here are local changes: the sync worker sees them and pushes
//! the syncable ones to the cloud store.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sourcedeck_sync::ChangeOrigin;
use std::sync::Arc;

use super::{error_response, sync_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SetPreferenceRequest {
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct SetPreferenceResponse {
    pub key: String,
    pub value: Value,
    pub changed: bool,
}

/// GET /api/preferences
pub async fn list_preferences(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    state
        .preferences
        .snapshot()
        .await
        .map(Json)
        .map_err(sync_error)
}

/// PUT /api/preferences/{key}
pub async fn set_preference(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<SetPreferenceRequest>,
) -> Result<Json<SetPreferenceResponse>, ApiError> {
    if key.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "preference key must not be empty",
        ));
    }

    let changed = state
        .preferences
        .set(&key, body.value.clone(), ChangeOrigin::Local)
        .await
        .map_err(sync_error)?;
    tracing::debug!(key = %key, changed, "preference written");

    Ok(Json(SetPreferenceResponse {
        key,
        value: body.value,
        changed,
    }))
}
