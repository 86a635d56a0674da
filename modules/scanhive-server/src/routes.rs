//! HTTP surface (§6.1): exactly the two operations the core exposes —
//! `execute_scan` and `get_scan`. No auth, billing, or pagination
//! middleware lives here; §6.3 assumes the store enforces tenant
//! isolation and the caller's own ingress layer handles auth.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use scanhive_orchestrator::{OrchestratorError, ScanOrchestrator, ScanRequest};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub fn build_router(orchestrator: Arc<ScanOrchestrator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/scans", post(create_scan))
        .route("/scans/{id}", get(read_scan))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { orchestrator })
}

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<ScanOrchestrator>,
}

async fn health() -> &'static str {
    "ok"
}

async fn create_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<scanhive_orchestrator::ScanSummary>, ApiError> {
    let summary = state.orchestrator.execute_scan(request).await?;
    Ok(Json(summary))
}

async fn read_scan(
    State(state): State<AppState>,
    Path(scan_id): Path<Uuid>,
) -> Result<Json<scanhive_orchestrator::ScanView>, ApiError> {
    let view = state.orchestrator.get_scan(scan_id).await?;
    Ok(Json(view))
}

/// Maps `OrchestratorError` onto the two synchronous propagation classes
/// §7 allows out of `execute_scan`: validation (client error) and
/// inability to reach the store (server error). `get_scan` reuses the
/// same mapping for a not-found scan.
struct ApiError(OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OrchestratorError::EmptyRequest
            | OrchestratorError::EmptyModuleSet(_)
            | OrchestratorError::UnknownModule { .. } => StatusCode::BAD_REQUEST,
            OrchestratorError::ScanNotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::Infrastructure(_) | OrchestratorError::Anyhow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
