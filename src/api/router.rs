//! HTTP API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`:
//!
//! - `POST /api/runs` — submit a document, returns 202 with the run id
//! - `GET /api/runs/:id` — condensed status for polling
//! - `GET /api/runs/:id/debug` — full record: stage trail, artifacts, logs
//! - `GET /api/health` — liveness probe

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, HealthResponse, SubmitRequest, SubmitResponse};
use crate::config;
use crate::lifecycle::PipelineService;
use crate::pipeline::types::{RunRecord, RunSummary};

/// Build the API router around a pipeline service.
pub fn api_router(service: Arc<PipelineService>) -> Router {
    let ctx = ApiContext::new(service);

    let routes = Router::new()
        .route("/health", get(health))
        .route("/runs", post(submit))
        .route("/runs/:id", get(status))
        .route("/runs/:id/debug", get(debug))
        .with_state(ctx);

    Router::new()
        .nest("/api", routes)
        .layer(CorsLayer::permissive())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        name: config::APP_NAME,
        version: config::APP_VERSION,
    })
}

async fn submit(
    State(ctx): State<ApiContext>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let run_id = ctx.service.submit(req.into())?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { run_id })))
}

async fn status(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunSummary>, ApiError> {
    Ok(Json(ctx.service.status(&id)?))
}

async fn debug(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunRecord>, ApiError> {
    Ok(Json(ctx.service.debug(&id)?))
}
