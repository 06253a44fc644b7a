//! Pipeline API handlers.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::info;

use enrich_core::PipelineRun;

use super::handlers::ApiError;
use crate::state::AppState;

/// Current or last pipeline run
pub async fn get_pipeline(State(state): State<Arc<AppState>>) -> Json<PipelineRun> {
    Json(state.orchestrator().pipeline_run().await)
}

/// Start a full run in the background
pub async fn run_pipeline(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<PipelineRun>), ApiError> {
    let run = state.orchestrator().start_pipeline().await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// Discard the current run and return every step to ready
pub async fn reset_pipeline(State(state): State<Arc<AppState>>) -> Json<PipelineRun> {
    info!("Pipeline reset requested");
    Json(state.orchestrator().reset_pipeline().await)
}
