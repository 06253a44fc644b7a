//! Step API handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use enrich_core::{CancelReport, StepConfig, StepDescriptor, StepRuntimeState};

use super::handlers::ApiError;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// A catalog step with its current config and runtime state
#[derive(Debug, Serialize)]
pub struct StepResponse {
    #[serde(flatten)]
    pub step: StepDescriptor,
    pub config: StepConfig,
    pub state: StepRuntimeState,
}

/// Response for listing steps
#[derive(Debug, Serialize)]
pub struct ListStepsResponse {
    pub steps: Vec<StepResponse>,
}

#[derive(Debug, Serialize)]
pub struct StopStepResponse {
    pub step_id: String,
    pub stopped: bool,
}

#[derive(Debug, Serialize)]
pub struct StopAllResponse {
    pub reports: Vec<CancelReport>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List steps in catalog order
pub async fn list_steps(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListStepsResponse>, ApiError> {
    let orchestrator = state.orchestrator();
    let mut steps = Vec::with_capacity(orchestrator.list_steps().len());
    for step in orchestrator.list_steps() {
        steps.push(step_response(&state, step).await?);
    }
    Ok(Json(ListStepsResponse { steps }))
}

pub async fn get_step(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StepResponse>, ApiError> {
    let step = state
        .orchestrator()
        .catalog()
        .get(&id)
        .ok_or_else(|| enrich_core::OrchestratorError::UnknownStep(id.clone()))?;
    Ok(Json(step_response(&state, step).await?))
}

pub async fn get_step_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StepConfig>, ApiError> {
    Ok(Json(state.orchestrator().get_config(&id).await?))
}

/// Update some options of a step. Returns the full merged config.
pub async fn update_step_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<StepConfig>, ApiError> {
    let config = state.orchestrator().set_config(&id, &body).await?;
    info!("Updated config of step {}", id);
    Ok(Json(config))
}

/// Launch a step. Returns once the backend has answered.
pub async fn run_step(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StepRuntimeState>, ApiError> {
    Ok(Json(state.orchestrator().run_step(&id).await?))
}

pub async fn stop_step(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StopStepResponse>, ApiError> {
    let stopped = state.orchestrator().stop_step(&id).await?;
    Ok(Json(StopStepResponse {
        step_id: id,
        stopped,
    }))
}

pub async fn stop_all(State(state): State<Arc<AppState>>) -> Json<StopAllResponse> {
    Json(StopAllResponse {
        reports: state.orchestrator().stop_all().await,
    })
}

async fn step_response(state: &AppState, step: &StepDescriptor) -> Result<StepResponse, ApiError> {
    let orchestrator = state.orchestrator();
    Ok(StepResponse {
        step: step.clone(),
        config: orchestrator.get_config(&step.id).await?,
        state: orchestrator.step_state(&step.id).await?,
    })
}
