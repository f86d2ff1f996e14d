//! Module catalog API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sourcedeck_modules::{ModuleRecord, RefreshReport};
use std::sync::Arc;
use uuid::Uuid;

use super::{module_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddModuleRequest {
    pub metadata_url: String,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

/// GET /api/modules
pub async fn list_modules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ModuleRecord>>, ApiError> {
    state
        .modules
        .list_modules()
        .await
        .map(Json)
        .map_err(module_error)
}

/// POST /api/modules
pub async fn add_module(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddModuleRequest>,
) -> Result<(StatusCode, Json<ModuleRecord>), ApiError> {
    let record = state
        .modules
        .add_module(body.metadata_url.trim())
        .await
        .map_err(module_error)?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/modules/{id}
pub async fn get_module(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ModuleRecord>, ApiError> {
    state
        .modules
        .get_module(id)
        .await
        .map(Json)
        .map_err(module_error)
}

/// DELETE /api/modules/{id}
pub async fn delete_module(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .modules
        .delete_module(id)
        .await
        .map_err(module_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/modules/{id}/content
///
/// The module's script as plain text.
pub async fn get_module_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<String, ApiError> {
    let record = state.modules.get_module(id).await.map_err(module_error)?;
    state
        .modules
        .get_module_content(&record)
        .await
        .map_err(module_error)
}

/// PUT /api/modules/{id}/active
pub async fn set_module_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetActiveRequest>,
) -> Result<Json<ModuleRecord>, ApiError> {
    state
        .modules
        .set_active(id, body.active)
        .await
        .map(Json)
        .map_err(module_error)
}

/// POST /api/modules/refresh
///
/// Best effort; failures are listed in the report.
pub async fn refresh_modules(State(state): State<Arc<AppState>>) -> Json<RefreshReport> {
    Json(state.modules.refresh_all().await)
}
