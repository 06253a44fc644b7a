//! Polls a background job until it reaches a terminal phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::backend::{JobBackend, JobHandle, JobPhase, JobStatus};
use crate::metrics::{JOBS_FINISHED, JOB_DURATION, POLLERS_ABANDONED, POLL_REQUESTS};

use super::status_table::StepStatusTable;
use super::types::StepPhase;

/// Tells a poll loop whether anyone is still watching its job.
///
/// Stopping a liveness tears down the loop; it does not cancel the remote
/// job.
#[derive(Debug)]
pub struct Liveness {
    alive: AtomicBool,
    notify: Notify,
}

impl Liveness {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(true),
            notify: Notify::new(),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Stop watching. Wakes a loop that is sleeping between polls.
    pub fn stop(&self) {
        self.alive.store(false, Ordering::SeqCst);
        // A stored permit covers a loop that has not started waiting yet.
        self.notify.notify_one();
    }

    /// Resolves once `stop` has been called.
    pub async fn stopped(&self) {
        while self.is_alive() {
            self.notify.notified().await;
        }
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The job reached a terminal phase (or polling gave up).
    Terminal(JobStatus),
    /// The loop was told to stop watching.
    Abandoned,
}

pub struct JobPoller {
    backend: Arc<dyn JobBackend>,
    table: Arc<StepStatusTable>,
    interval: Duration,
    max_consecutive_failures: u32,
}

impl JobPoller {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        table: Arc<StepStatusTable>,
        interval: Duration,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            backend,
            table,
            interval,
            max_consecutive_failures: max_consecutive_failures.max(1),
        }
    }

    /// Poll `handle` until its job is terminal, calling `on_progress` with
    /// every observation.
    ///
    /// Only writes to the step slot while that slot still holds `handle`.
    /// A failed status request is retried; after `max_consecutive_failures`
    /// failures in a row the step is marked `error`.
    pub async fn poll<F>(
        &self,
        step_id: &str,
        handle: &JobHandle,
        liveness: &Liveness,
        mut on_progress: F,
    ) -> PollOutcome
    where
        F: FnMut(JobPhase, u8) + Send,
    {
        let started = Instant::now();
        let mut failures: u32 = 0;

        debug!("Polling job {} for step {}", handle.job_id, step_id);

        loop {
            if !liveness.is_alive() {
                return self.abandon(step_id, handle);
            }

            match self.backend.status(&handle.status_address).await {
                Ok(status) => {
                    POLL_REQUESTS.with_label_values(&["ok"]).inc();
                    failures = 0;

                    if !liveness.is_alive() {
                        return self.abandon(step_id, handle);
                    }

                    debug!(
                        "Job {} ({}): {} {}%",
                        handle.job_id,
                        step_id,
                        status.phase.as_str(),
                        status.progress_percent
                    );
                    on_progress(status.phase, status.progress_percent);

                    if status.phase.is_terminal() {
                        self.record_terminal(step_id, handle, &status, started).await;
                        return PollOutcome::Terminal(status);
                    }
                    if !self.record_progress(step_id, handle, &status).await {
                        return self.abandon(step_id, handle);
                    }
                }
                Err(e) => {
                    POLL_REQUESTS.with_label_values(&["transient_error"]).inc();
                    failures += 1;
                    warn!(
                        "Status request for job {} ({}) failed ({}/{}): {}",
                        handle.job_id, step_id, failures, self.max_consecutive_failures, e
                    );

                    if failures >= self.max_consecutive_failures {
                        let status = JobStatus::error(format!(
                            "network failure: {} consecutive status requests failed, last error: {}",
                            failures, e
                        ));
                        if !liveness.is_alive() {
                            return self.abandon(step_id, handle);
                        }
                        on_progress(status.phase, status.progress_percent);
                        self.record_terminal(step_id, handle, &status, started).await;
                        return PollOutcome::Terminal(status);
                    }
                }
            }

            tokio::select! {
                _ = liveness.stopped() => return self.abandon(step_id, handle),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    fn abandon(&self, step_id: &str, handle: &JobHandle) -> PollOutcome {
        info!("Stopped watching job {} for step {}", handle.job_id, step_id);
        POLLERS_ABANDONED.inc();
        PollOutcome::Abandoned
    }

    /// Non-terminal observation: progress only moves forward, and a local
    /// `stopping` is kept until the job itself becomes terminal.
    ///
    /// Returns false once the step no longer holds `handle`.
    async fn record_progress(
        &self,
        step_id: &str,
        handle: &JobHandle,
        status: &JobStatus,
    ) -> bool {
        let mut owned = false;
        let result = self
            .table
            .modify(step_id, |s| {
                if s.active_handle.as_ref() != Some(handle) {
                    return Ok(false);
                }
                owned = true;
                let phase = if s.phase == StepPhase::Stopping {
                    StepPhase::Stopping
                } else {
                    StepPhase::from(status.phase)
                };
                let progress = s.progress_percent.max(status.progress_percent);
                if phase == s.phase && progress == s.progress_percent {
                    return Ok(false);
                }
                s.phase = phase;
                s.progress_percent = progress;
                Ok(true)
            })
            .await;
        if let Err(e) = result {
            warn!("Failed to record progress for step {}: {}", step_id, e);
        }
        owned
    }

    async fn record_terminal(
        &self,
        step_id: &str,
        handle: &JobHandle,
        status: &JobStatus,
        started: Instant,
    ) {
        let phase = StepPhase::from(status.phase);
        let result = self
            .table
            .modify(step_id, |s| {
                if s.active_handle.as_ref() != Some(handle) {
                    return Ok(false);
                }
                s.phase = phase;
                s.active_handle = None;
                match phase {
                    StepPhase::Completed => {
                        s.progress_percent = 100;
                        s.result = status.result.clone();
                        s.error_detail = None;
                    }
                    StepPhase::Error => {
                        s.error_detail = Some(
                            status
                                .error_detail
                                .clone()
                                .unwrap_or_else(|| "job failed".to_string()),
                        );
                    }
                    _ => {}
                }
                Ok(true)
            })
            .await;

        match result {
            Ok(_) => {
                JOBS_FINISHED
                    .with_label_values(&[step_id, phase.as_str()])
                    .inc();
                JOB_DURATION
                    .with_label_values(&[step_id, phase.as_str()])
                    .observe(started.elapsed().as_secs_f64());
                info!(
                    "Job {} for step {} finished: {}",
                    handle.job_id,
                    step_id,
                    phase.as_str()
                );
            }
            Err(e) => warn!("Failed to record terminal state for step {}: {}", step_id, e),
        }
    }
}
