//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: &'static str,
}

/// GET /health: returns system health status.
pub async fn check<O, S>(
    State(state): State<Arc<AppState<O, S>>>,
) -> (StatusCode, Json<HealthResponse>)
where
    O: Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    let storage = state.storage.name();
    match state.storage.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                storage,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, storage, "storage health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    storage,
                }),
            )
        }
    }
}
