//! Step runner.
//!
//! Ties a launch to its poll loop. Every deferred job gets one watcher task
//! of its own; watchers are independent and only meet in the status table.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::JobHandle;

use super::launcher::JobLauncher;
use super::poller::{JobPoller, Liveness, PollOutcome};
use super::status_table::StepStatusTable;
use super::types::{LaunchOutcome, OrchestratorError, StepPhase, StepRuntimeState};

type Watchers = Arc<Mutex<HashMap<String, Arc<Liveness>>>>;

pub struct StepRunner {
    launcher: JobLauncher,
    poller: Arc<JobPoller>,
    table: Arc<StepStatusTable>,
    /// Liveness of the watcher task of each step that has one.
    watchers: Watchers,
}

impl StepRunner {
    pub fn new(launcher: JobLauncher, poller: JobPoller, table: Arc<StepStatusTable>) -> Self {
        Self {
            launcher,
            poller: Arc::new(poller),
            table,
            watchers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Launch a step and return as soon as the backend answered. A
    /// deferred job keeps being polled in the background.
    pub async fn run_step(&self, step_id: &str) -> Result<StepRuntimeState, OrchestratorError> {
        let launched = self.launcher.launch(step_id).await?;
        // An uncommitted launch belongs to a forgotten attempt: nothing to watch.
        if let LaunchOutcome::Deferred(handle) = launched.outcome {
            if launched.committed {
                self.watch(step_id, handle).await;
            }
        }
        self.state(step_id).await
    }

    /// Launch a step and wait until it is terminal (or stops being watched).
    pub async fn execute_step(
        &self,
        step_id: &str,
    ) -> Result<StepRuntimeState, OrchestratorError> {
        let launched = self.launcher.launch(step_id).await?;
        match launched.outcome {
            LaunchOutcome::Deferred(handle) if launched.committed => {
                let watcher = self.watch(step_id, handle).await;
                match watcher.await {
                    Ok(PollOutcome::Terminal(status)) => {
                        debug!("Step {} ended with {}", step_id, status.phase.as_str())
                    }
                    Ok(PollOutcome::Abandoned) => debug!("Step {} was forgotten", step_id),
                    Err(e) => warn!("Watcher for step {} failed: {}", step_id, e),
                }
            }
            LaunchOutcome::Deferred(_) => debug!("Step {} was forgotten during launch", step_id),
            LaunchOutcome::Immediate(_) => {}
        }
        self.state(step_id).await
    }

    /// Stop watching a step's job and return the step to `ready`.
    ///
    /// The remote job is left alone. Bumping the attempt makes any launch
    /// still in flight discard its answer.
    pub async fn forget(&self, step_id: &str) -> Result<StepRuntimeState, OrchestratorError> {
        if let Some(liveness) = self.watchers.lock().await.remove(step_id) {
            liveness.stop();
        }

        self.table
            .modify(step_id, |s| {
                s.attempt += 1;
                if s.phase != StepPhase::Disabled {
                    s.phase = StepPhase::Ready;
                }
                s.progress_percent = 0;
                s.result = None;
                s.error_detail = None;
                s.active_handle = None;
                Ok(true)
            })
            .await
    }

    pub async fn forget_all(&self) {
        for state in self.table.snapshot().await {
            if let Err(e) = self.forget(&state.step_id).await {
                warn!("Failed to reset step {}: {}", state.step_id, e);
            }
        }
    }

    /// Stop every watcher without touching step state.
    pub async fn shutdown(&self) {
        let watchers: Vec<_> = self.watchers.lock().await.drain().collect();
        for (step_id, liveness) in &watchers {
            debug!("Stopping watcher for step {}", step_id);
            liveness.stop();
        }
        info!("Stopped {} job watchers", watchers.len());
    }

    /// Number of steps whose jobs are currently being polled.
    pub async fn watcher_count(&self) -> usize {
        self.watchers.lock().await.len()
    }

    async fn state(&self, step_id: &str) -> Result<StepRuntimeState, OrchestratorError> {
        self.table
            .get(step_id)
            .await
            .ok_or_else(|| OrchestratorError::UnknownStep(step_id.to_string()))
    }

    async fn watch(&self, step_id: &str, handle: JobHandle) -> JoinHandle<PollOutcome> {
        let liveness = Liveness::new();
        if let Some(previous) = self
            .watchers
            .lock()
            .await
            .insert(step_id.to_string(), Arc::clone(&liveness))
        {
            previous.stop();
        }

        let poller = Arc::clone(&self.poller);
        let watchers = Arc::clone(&self.watchers);
        let step_id = step_id.to_string();

        tokio::spawn(async move {
            let outcome = poller
                .poll(&step_id, &handle, &liveness, |phase, progress| {
                    debug!("Step {} observed {} {}%", step_id, phase.as_str(), progress)
                })
                .await;

            let mut watchers = watchers.lock().await;
            if watchers
                .get(&step_id)
                .is_some_and(|current| Arc::ptr_eq(current, &liveness))
            {
                watchers.remove(&step_id);
            }
            outcome
        })
    }
}
