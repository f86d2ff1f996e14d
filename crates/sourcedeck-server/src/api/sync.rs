//! Cloud sync endpoints.
//!
//! `/sync/*` runs a reconciliation and returns its report. `/lifecycle/*`
//! queues a trigger for the background worker and returns immediately,
//! the way a host app signals foreground and background transitions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use sourcedeck_sync::{SyncReport, SyncTrigger};
use std::sync::Arc;

use super::{error_response, ApiError};
use crate::state::{AppState, SyncHandle};

fn sync_handle(state: &AppState) -> Result<&SyncHandle, ApiError> {
    state.sync.as_ref().ok_or_else(|| {
        error_response(StatusCode::SERVICE_UNAVAILABLE, "cloud sync is disabled")
    })
}

/// POST /api/sync/pull
///
/// Cloud wins.
pub async fn pull(State(state): State<Arc<AppState>>) -> Result<Json<SyncReport>, ApiError> {
    let sync = sync_handle(&state)?;
    Ok(Json(sync.reconciler.handle(SyncTrigger::Foreground).await))
}

/// POST /api/sync/push
///
/// Local wins.
pub async fn push(State(state): State<Arc<AppState>>) -> Result<Json<SyncReport>, ApiError> {
    let sync = sync_handle(&state)?;
    Ok(Json(sync.reconciler.handle(SyncTrigger::Background).await))
}

/// POST /api/sync/cloud-changed
///
/// The platform reports an external change.
pub async fn cloud_changed(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SyncReport>, ApiError> {
    let sync = sync_handle(&state)?;
    Ok(Json(sync.reconciler.handle(SyncTrigger::CloudChanged).await))
}

#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub queued: SyncTrigger,
}

/// POST /api/lifecycle/{foreground|background}
pub async fn lifecycle(
    State(state): State<Arc<AppState>>,
    Path(phase): Path<String>,
) -> Result<(StatusCode, Json<LifecycleResponse>), ApiError> {
    let trigger = match phase.as_str() {
        "foreground" => SyncTrigger::Foreground,
        "background" => SyncTrigger::Background,
        other => {
            return Err(error_response(
                StatusCode::NOT_FOUND,
                format!("unknown lifecycle phase '{other}'"),
            ))
        }
    };

    let sync = sync_handle(&state)?;
    sync.triggers.send(trigger).await.map_err(|_| {
        tracing::error!(?trigger, "sync worker is not running");
        error_response(StatusCode::SERVICE_UNAVAILABLE, "sync worker is not running")
    })?;

    Ok((StatusCode::ACCEPTED, Json(LifecycleResponse { queued: trigger })))
}
