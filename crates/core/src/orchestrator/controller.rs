//! Stop requests for running jobs.

use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::{JobBackend, JobHandle};
use crate::metrics::CANCEL_REQUESTS;

use super::status_table::StepStatusTable;
use super::types::{CancelReport, OrchestratorError, StepPhase};

enum CancelAttempt {
    /// No job in flight, or a stop is already pending.
    NothingToCancel,
    Accepted,
    Rejected,
    Failed(String),
}

pub struct JobController {
    backend: Arc<dyn JobBackend>,
    table: Arc<StepStatusTable>,
}

impl JobController {
    pub fn new(backend: Arc<dyn JobBackend>, table: Arc<StepStatusTable>) -> Self {
        Self { backend, table }
    }

    /// Ask the backend to stop the step's job.
    ///
    /// The step shows `stopping` while the request is out. If the backend
    /// refuses or cannot be reached, the previous phase is restored.
    /// Returns whether the backend accepted; stopping a step with nothing in
    /// flight is a no-op returning `false`.
    pub async fn cancel(&self, step_id: &str) -> Result<bool, OrchestratorError> {
        match self.attempt_cancel(step_id).await? {
            CancelAttempt::Accepted => Ok(true),
            CancelAttempt::NothingToCancel | CancelAttempt::Rejected | CancelAttempt::Failed(_) => {
                Ok(false)
            }
        }
    }

    /// Cancel every step whose job is queued or running.
    pub async fn cancel_all(&self) -> Vec<CancelReport> {
        let targets: Vec<String> = self
            .table
            .snapshot()
            .await
            .into_iter()
            .filter(|s| {
                matches!(s.phase, StepPhase::Queued | StepPhase::Running)
                    && s.active_handle.is_some()
            })
            .map(|s| s.step_id)
            .collect();

        let mut reports = Vec::with_capacity(targets.len());
        for step_id in targets {
            let report = match self.attempt_cancel(&step_id).await {
                Ok(CancelAttempt::Accepted) => CancelReport {
                    step_id,
                    stopped: true,
                    error: None,
                },
                Ok(CancelAttempt::NothingToCancel) => CancelReport {
                    step_id,
                    stopped: false,
                    error: Some("nothing to stop".to_string()),
                },
                Ok(CancelAttempt::Rejected) => CancelReport {
                    step_id,
                    stopped: false,
                    error: Some("cancellation rejected by backend".to_string()),
                },
                Ok(CancelAttempt::Failed(e)) => CancelReport {
                    step_id,
                    stopped: false,
                    error: Some(e),
                },
                Err(e) => CancelReport {
                    step_id,
                    stopped: false,
                    error: Some(e.to_string()),
                },
            };
            reports.push(report);
        }

        let stopped = reports.iter().filter(|r| r.stopped).count();
        info!("Stop-all: {}/{} jobs stopped", stopped, reports.len());
        reports
    }

    async fn attempt_cancel(&self, step_id: &str) -> Result<CancelAttempt, OrchestratorError> {
        let mut previous: Option<(StepPhase, JobHandle)> = None;
        self.table
            .modify(step_id, |s| {
                let handle = match (&s.active_handle, s.phase) {
                    (Some(h), StepPhase::Queued | StepPhase::Running) => h.clone(),
                    _ => return Ok(false),
                };
                previous = Some((s.phase, handle));
                s.phase = StepPhase::Stopping;
                Ok(true)
            })
            .await?;

        let Some((previous_phase, handle)) = previous else {
            return Ok(CancelAttempt::NothingToCancel);
        };

        info!("Stopping step {} (job {})", step_id, handle.job_id);

        let attempt = match self.backend.cancel(&handle).await {
            Ok(true) => {
                CANCEL_REQUESTS.with_label_values(&["accepted"]).inc();
                return Ok(CancelAttempt::Accepted);
            }
            Ok(false) => {
                CANCEL_REQUESTS.with_label_values(&["rejected"]).inc();
                warn!("Backend refused to stop job {} ({})", handle.job_id, step_id);
                CancelAttempt::Rejected
            }
            Err(e) => {
                CANCEL_REQUESTS.with_label_values(&["failed"]).inc();
                warn!("Failed to stop job {} ({}): {}", handle.job_id, step_id, e);
                CancelAttempt::Failed(e.to_string())
            }
        };

        // Undo the optimistic `stopping`, unless the poller got there first.
        self.table
            .modify(step_id, |s| {
                if s.phase != StepPhase::Stopping || s.active_handle.as_ref() != Some(&handle) {
                    return Ok(false);
                }
                s.phase = previous_phase;
                Ok(true)
            })
            .await?;

        Ok(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::steps::StepCatalog;
    use crate::testing::{fixtures, MockBackend};

    struct Harness {
        backend: Arc<MockBackend>,
        table: Arc<StepStatusTable>,
        controller: JobController,
    }

    fn harness() -> Harness {
        let backend = Arc::new(MockBackend::new());
        let table = Arc::new(StepStatusTable::new(&StepCatalog::default_workflow(), &[]));
        let controller = JobController::new(
            Arc::clone(&backend) as Arc<dyn JobBackend>,
            Arc::clone(&table),
        );
        Harness {
            backend,
            table,
            controller,
        }
    }

    async fn running(table: &StepStatusTable, step_id: &str, job_id: &str, progress: u8) {
        let handle = fixtures::job_handle(job_id);
        table
            .modify(step_id, move |s| {
                s.phase = StepPhase::Running;
                s.progress_percent = progress;
                s.active_handle = Some(handle);
                Ok(true)
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_accepted_cancel_leaves_step_stopping() {
        let h = harness();
        running(&h.table, "extract", "J1", 40).await;

        assert!(h.controller.cancel("extract").await.unwrap());

        let state = h.table.get("extract").await.unwrap();
        assert_eq!(state.phase, StepPhase::Stopping);
        assert_eq!(state.progress_percent, 40);
        assert_eq!(state.active_handle.unwrap().job_id, "J1");
        assert_eq!(h.backend.recorded_cancels().await[0].job_id, "J1");
    }

    #[tokio::test]
    async fn test_network_failure_reverts_phase() {
        let h = harness();
        running(&h.table, "extract", "J1", 40).await;
        h.backend
            .set_cancel_response("J1", Err(BackendError::ConnectionFailed("reset".to_string())))
            .await;

        let mut rx = h.table.subscribe();
        assert!(!h.controller.cancel("extract").await.unwrap());

        assert_eq!(rx.recv().await.unwrap().phase, StepPhase::Stopping);
        assert_eq!(rx.recv().await.unwrap().phase, StepPhase::Running);

        let state = h.table.get("extract").await.unwrap();
        assert_eq!(state.phase, StepPhase::Running);
        assert_eq!(state.progress_percent, 40);
        assert!(state.active_handle.is_some());
    }

    #[tokio::test]
    async fn test_rejected_cancel_reverts_phase() {
        let h = harness();
        running(&h.table, "sync", "J2", 10).await;
        h.backend.set_cancel_response("J2", Ok(false)).await;

        assert!(!h.controller.cancel("sync").await.unwrap());
        assert_eq!(h.table.get("sync").await.unwrap().phase, StepPhase::Running);
    }

    #[tokio::test]
    async fn test_cancel_without_job_is_noop() {
        let h = harness();
        let mut rx = h.table.subscribe();

        assert!(!h.controller.cancel("extract").await.unwrap());
        assert_eq!(h.backend.cancel_count().await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_stop_is_noop() {
        let h = harness();
        running(&h.table, "extract", "J1", 40).await;

        assert!(h.controller.cancel("extract").await.unwrap());
        assert!(!h.controller.cancel("extract").await.unwrap());
        assert_eq!(h.backend.cancel_count().await, 1);
        assert_eq!(
            h.table.get("extract").await.unwrap().phase,
            StepPhase::Stopping
        );
    }

    #[tokio::test]
    async fn test_cancel_unknown_step() {
        let h = harness();
        let err = h.controller.cancel("ghost").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownStep(_)));
    }

    #[tokio::test]
    async fn test_cancel_all_reports_each_step() {
        let h = harness();
        running(&h.table, "extract", "J1", 40).await;
        running(&h.table, "augment", "J3", 5).await;
        h.backend
            .set_cancel_response("J3", Err(BackendError::Timeout))
            .await;

        let reports = h.controller.cancel_all().await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].step_id, "extract");
        assert!(reports[0].stopped);
        assert_eq!(reports[1].step_id, "augment");
        assert!(!reports[1].stopped);
        assert_eq!(reports[1].error.as_deref(), Some("Request timeout"));

        assert_eq!(
            h.table.get("augment").await.unwrap().phase,
            StepPhase::Running
        );
    }

    #[tokio::test]
    async fn test_cancel_all_with_nothing_running() {
        let h = harness();
        assert!(h.controller.cancel_all().await.is_empty());
        assert_eq!(h.backend.cancel_count().await, 0);
    }
}
