pub mod modules;
pub mod preferences;
pub mod sync;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use sourcedeck_modules::ModuleError;
use sourcedeck_sync::SyncError;

use crate::state::AppState;

/// Error response shared by all handlers: a status and `{"error": "..."}`.
pub type ApiError = (StatusCode, Json<serde_json::Value>);

pub(crate) fn error_response(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
}

/// Map a module failure to its HTTP status.
pub(crate) fn module_error(err: ModuleError) -> ApiError {
    let status = match &err {
        ModuleError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        ModuleError::DuplicateModule(_) => StatusCode::CONFLICT,
        ModuleError::Network(_) => StatusCode::BAD_GATEWAY,
        ModuleError::Decode(_) | ModuleError::Encoding(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ModuleError::NotFound(_) => StatusCode::NOT_FOUND,
        ModuleError::Catalog(_) | ModuleError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("module operation failed: {err}");
    } else {
        tracing::debug!("module request rejected: {err}");
    }
    error_response(status, err)
}

pub(crate) fn sync_error(err: SyncError) -> ApiError {
    match err {
        SyncError::Catalog(inner) => module_error(inner),
        unavailable @ SyncError::CloudUnavailable => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, unavailable)
        }
        other => {
            tracing::error!("sync operation failed: {other}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, other)
        }
    }
}

/// Build the `/api` router.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route(
            "/modules",
            get(modules::list_modules).post(modules::add_module),
        )
        .route("/modules/refresh", post(modules::refresh_modules))
        .route(
            "/modules/{id}",
            get(modules::get_module).delete(modules::delete_module),
        )
        .route("/modules/{id}/content", get(modules::get_module_content))
        .route("/modules/{id}/active", put(modules::set_module_active))
        .route("/preferences", get(preferences::list_preferences))
        .route("/preferences/{key}", put(preferences::set_preference))
        .route("/sync/pull", post(sync::pull))
        .route("/sync/push", post(sync::push))
        .route("/sync/cloud-changed", post(sync::cloud_changed))
        .route("/lifecycle/{phase}", post(sync::lifecycle));

    Router::new().nest("/api", api).with_state(state)
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
    cloud_sync: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        cloud_sync: state.sync.is_some(),
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[test]
    fn test_module_error_statuses() {
        let cases = [
            (ModuleError::InvalidUrl("x".into()), StatusCode::BAD_REQUEST),
            (ModuleError::DuplicateModule("x".into()), StatusCode::CONFLICT),
            (ModuleError::Network("x".into()), StatusCode::BAD_GATEWAY),
            (ModuleError::Decode("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ModuleError::Encoding("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ModuleError::NotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (ModuleError::Catalog("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let (status, Json(body)) = module_error(err);
            assert_eq!(status, expected);
            assert!(body["error"].is_string());
        }
    }

    #[test]
    fn test_sync_error_unwraps_catalog_errors() {
        let (status, _) = sync_error(SyncError::Catalog(ModuleError::NotFound(Uuid::nil())));
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = sync_error(SyncError::CloudUnavailable);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app().await;
        let resp = app
            .router()
            .oneshot(empty_request("GET", "/api/health"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["cloud_sync"], true);
    }
}
