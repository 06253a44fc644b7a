//! Sequential full-pipeline runs over the step catalog.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::PIPELINE_RUNS;
use crate::steps::StepCatalog;

use super::runner::StepRunner;
use super::status_table::StepStatusTable;
use super::types::{OrchestratorError, PipelineRun, PipelineState, StepOutcome, StepPhase};

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Runs every catalog step in order through the same runner used for
/// single steps.
///
/// A step ending in `error` is recorded and the run moves on; a step ending
/// in `stopped` aborts the run.
pub struct PipelineCoordinator {
    catalog: Arc<StepCatalog>,
    table: Arc<StepStatusTable>,
    runner: Arc<StepRunner>,
    run: RwLock<PipelineRun>,
    updates: broadcast::Sender<PipelineRun>,
}

impl PipelineCoordinator {
    pub fn new(
        catalog: Arc<StepCatalog>,
        table: Arc<StepStatusTable>,
        runner: Arc<StepRunner>,
    ) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            catalog,
            table,
            runner,
            run: RwLock::new(PipelineRun::default()),
            updates,
        }
    }

    /// Current (or last) run.
    pub async fn current(&self) -> PipelineRun {
        self.run.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineRun> {
        self.updates.subscribe()
    }

    /// Start a run and drive it to the end.
    pub async fn run_pipeline(&self) -> Result<PipelineRun, OrchestratorError> {
        let run_id = self.begin().await?;
        self.drive(run_id).await
    }

    /// `Idle → Running(0)`. Fails if a run is already in progress.
    pub async fn begin(&self) -> Result<Uuid, OrchestratorError> {
        let mut run = self.run.write().await;
        if run.is_running {
            return Err(OrchestratorError::PipelineAlreadyRunning);
        }

        let run_id = Uuid::new_v4();
        *run = PipelineRun {
            run_id: Some(run_id),
            state: PipelineState::Running { step_index: 0 },
            is_running: true,
            current_step_index: 0,
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        let _ = self.updates.send(run.clone());

        info!("Pipeline run {} started ({} steps)", run_id, self.catalog.len());
        Ok(run_id)
    }

    /// Execute the steps of run `run_id`. Returns `PipelineReset` if the run
    /// is discarded midway.
    pub async fn drive(&self, run_id: Uuid) -> Result<PipelineRun, OrchestratorError> {
        for (index, step) in self.catalog.list_steps().iter().enumerate() {
            self.update(run_id, |run| {
                run.current_step_index = index;
                run.state = PipelineState::Running { step_index: index };
            })
            .await?;

            let disabled = self
                .table
                .get(&step.id)
                .await
                .is_some_and(|s| s.phase == StepPhase::Disabled);

            let outcome = if disabled {
                info!("Pipeline: skipping disabled step {}", step.id);
                StepOutcome::Skipped {
                    reason: "step is disabled".to_string(),
                }
            } else {
                info!("Pipeline: running step {} ({}/{})", step.id, index + 1, self.catalog.len());
                match self.runner.execute_step(&step.id).await {
                    Ok(state) => match state.phase {
                        StepPhase::Completed => StepOutcome::Completed {
                            result: state.result,
                        },
                        StepPhase::Stopped => StepOutcome::Stopped,
                        StepPhase::Error => StepOutcome::Error {
                            detail: state
                                .error_detail
                                .unwrap_or_else(|| "step failed".to_string()),
                        },
                        other => StepOutcome::Error {
                            detail: format!("step ended in phase {}", other.as_str()),
                        },
                    },
                    Err(e) => {
                        warn!("Pipeline: step {} could not run: {}", step.id, e);
                        StepOutcome::Error {
                            detail: e.to_string(),
                        }
                    }
                }
            };

            let aborted = outcome == StepOutcome::Stopped;
            let run = self
                .update(run_id, |run| {
                    run.aggregated_results.insert(step.id.clone(), outcome);
                    if aborted {
                        run.state = PipelineState::Aborted;
                        run.is_running = false;
                        run.finished_at = Some(Utc::now());
                    }
                })
                .await?;

            if aborted {
                info!("Pipeline run {} aborted: step {} was stopped", run_id, step.id);
                PIPELINE_RUNS.with_label_values(&["aborted"]).inc();
                return Ok(run);
            }
        }

        let len = self.catalog.len();
        let run = self
            .update(run_id, |run| {
                run.current_step_index = len;
                run.state = PipelineState::Finished;
                run.is_running = false;
                run.finished_at = Some(Utc::now());
            })
            .await?;

        info!("Pipeline run {} finished", run_id);
        PIPELINE_RUNS.with_label_values(&["finished"]).inc();
        Ok(run)
    }

    /// Discard the current run, stop watching every job and return all
    /// steps to `ready`. Remote jobs are not cancelled.
    pub async fn reset(&self) -> PipelineRun {
        let was_running = {
            let mut run = self.run.write().await;
            let was_running = run.is_running;
            *run = PipelineRun::default();
            let _ = self.updates.send(run.clone());
            was_running
        };

        self.runner.forget_all().await;

        if was_running {
            PIPELINE_RUNS.with_label_values(&["reset"]).inc();
        }
        info!("Pipeline reset");
        self.current().await
    }

    async fn update<F>(&self, run_id: Uuid, f: F) -> Result<PipelineRun, OrchestratorError>
    where
        F: FnOnce(&mut PipelineRun),
    {
        let mut run = self.run.write().await;
        if run.run_id != Some(run_id) {
            return Err(OrchestratorError::PipelineReset);
        }
        f(&mut run);
        let _ = self.updates.send(run.clone());
        Ok(run.clone())
    }
}
