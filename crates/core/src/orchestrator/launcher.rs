//! Issues the start call for a step and classifies the answer.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, info};

use crate::backend::JobBackend;
use crate::metrics::{LAUNCHES_REJECTED, STEP_LAUNCHES};
use crate::steps::{StepCatalog, StepConfigStore, StepDescriptor};

use super::status_table::StepStatusTable;
use super::types::{LaunchOutcome, OrchestratorError, StepPhase};

/// A successful launch and the attempt it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Launched {
    pub attempt: u64,
    pub outcome: LaunchOutcome,
    /// False when the step was forgotten while the start call was out; the
    /// outcome was not written and must not be acted on.
    pub committed: bool,
}

pub struct JobLauncher {
    catalog: Arc<StepCatalog>,
    config_store: Arc<StepConfigStore>,
    backend: Arc<dyn JobBackend>,
    table: Arc<StepStatusTable>,
}

impl JobLauncher {
    pub fn new(
        catalog: Arc<StepCatalog>,
        config_store: Arc<StepConfigStore>,
        backend: Arc<dyn JobBackend>,
        table: Arc<StepStatusTable>,
    ) -> Self {
        Self {
            catalog,
            config_store,
            backend,
            table,
        }
    }

    /// Start a step.
    ///
    /// The step's slot is claimed before the call goes out, so a second
    /// launch of the same step is rejected until the first one reaches a
    /// terminal phase. A synchronous answer is written as `completed`; a job
    /// handle leaves the step `running` with the handle attached.
    pub async fn launch(&self, step_id: &str) -> Result<Launched, OrchestratorError> {
        let step = self
            .catalog
            .get(step_id)
            .ok_or_else(|| OrchestratorError::UnknownStep(step_id.to_string()))?;
        let payload = self.build_payload(step).await?;

        let claimed = self
            .table
            .modify(step_id, |s| {
                if s.phase == StepPhase::Disabled {
                    return Err(OrchestratorError::StepDisabled(s.step_id.clone()));
                }
                if s.phase.is_active() || s.active_handle.is_some() {
                    return Err(OrchestratorError::AlreadyActive(s.step_id.clone()));
                }
                s.attempt += 1;
                s.phase = StepPhase::Running;
                s.progress_percent = 0;
                s.result = None;
                s.error_detail = None;
                s.active_handle = None;
                Ok(true)
            })
            .await;
        let attempt = match claimed {
            Ok(state) => state.attempt,
            Err(e) => {
                if matches!(e, OrchestratorError::AlreadyActive(_)) {
                    LAUNCHES_REJECTED.inc();
                }
                return Err(e);
            }
        };

        info!("Launching step {} (attempt {})", step_id, attempt);

        let body = match self.backend.start(&step.operation, &payload).await {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to launch step {}: {}", step_id, e);
                STEP_LAUNCHES.with_label_values(&[step_id, "failed"]).inc();
                let detail = e.to_string();
                self.table
                    .modify(step_id, |s| {
                        if s.attempt != attempt {
                            return Ok(false);
                        }
                        s.phase = StepPhase::Error;
                        s.error_detail = Some(detail);
                        s.active_handle = None;
                        Ok(true)
                    })
                    .await?;
                return Err(OrchestratorError::Launch {
                    step_id: step_id.to_string(),
                    source: e,
                });
            }
        };

        let outcome = LaunchOutcome::classify(body);
        STEP_LAUNCHES
            .with_label_values(&[step_id, outcome.mode()])
            .inc();

        let mut committed = false;
        self.table
            .modify(step_id, |s| {
                // The step was forgotten while the call was in flight.
                if s.attempt != attempt {
                    return Ok(false);
                }
                committed = true;
                match &outcome {
                    LaunchOutcome::Immediate(result) => {
                        s.phase = StepPhase::Completed;
                        s.progress_percent = 100;
                        s.result = Some(result.clone());
                    }
                    LaunchOutcome::Deferred(handle) => {
                        s.active_handle = Some(handle.clone());
                    }
                }
                Ok(true)
            })
            .await?;

        match &outcome {
            _ if !committed => info!(
                "Step {} was reset during launch; discarding its answer",
                step_id
            ),
            LaunchOutcome::Immediate(_) => info!("Step {} completed synchronously", step_id),
            LaunchOutcome::Deferred(handle) => {
                info!("Step {} started job {}", step_id, handle.job_id)
            }
        }

        Ok(Launched {
            attempt,
            outcome,
            committed,
        })
    }

    /// Default payload shape with the current config merged on top.
    async fn build_payload(&self, step: &StepDescriptor) -> Result<Value, OrchestratorError> {
        let config = self.config_store.get_config(&step.id).await?;
        let mut body: Map<String, Value> = match &step.default_payload {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        body.extend(config);
        Ok(Value::Object(body))
    }
}
