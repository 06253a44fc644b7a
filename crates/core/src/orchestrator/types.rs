//! Types for the job orchestrator.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::backend::{BackendError, JobHandle, JobPhase};
use crate::steps::StepConfigError;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Step id not in the catalog.
    #[error("unknown step: {0}")]
    UnknownStep(String),

    /// Step is disabled by configuration.
    #[error("step is disabled: {0}")]
    StepDisabled(String),

    /// Step already has a job in flight.
    #[error("step already active: {0}")]
    AlreadyActive(String),

    /// The start call failed.
    #[error("failed to launch step {step_id}: {source}")]
    Launch {
        step_id: String,
        #[source]
        source: BackendError,
    },

    /// A pipeline run is already in progress.
    #[error("pipeline already running")]
    PipelineAlreadyRunning,

    /// The pipeline run was discarded by a reset while it was in progress.
    #[error("pipeline run was reset")]
    PipelineReset,

    /// Step configuration error.
    #[error("step config error: {0}")]
    Config(#[from] StepConfigError),
}

/// Local phase of a step.
///
/// Mirrors the remote job phase, plus `ready` before any launch and
/// `disabled` for steps turned off in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Ready,
    Disabled,
    Queued,
    Running,
    Stopping,
    Stopped,
    Completed,
    Error,
}

impl StepPhase {
    /// A launch or job is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, StepPhase::Queued | StepPhase::Running | StepPhase::Stopping)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepPhase::Stopped | StepPhase::Completed | StepPhase::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepPhase::Ready => "ready",
            StepPhase::Disabled => "disabled",
            StepPhase::Queued => "queued",
            StepPhase::Running => "running",
            StepPhase::Stopping => "stopping",
            StepPhase::Stopped => "stopped",
            StepPhase::Completed => "completed",
            StepPhase::Error => "error",
        }
    }

    pub const ALL: [StepPhase; 8] = [
        StepPhase::Ready,
        StepPhase::Disabled,
        StepPhase::Queued,
        StepPhase::Running,
        StepPhase::Stopping,
        StepPhase::Stopped,
        StepPhase::Completed,
        StepPhase::Error,
    ];
}

impl From<JobPhase> for StepPhase {
    fn from(phase: JobPhase) -> Self {
        match phase {
            JobPhase::Queued => StepPhase::Queued,
            JobPhase::Running => StepPhase::Running,
            JobPhase::Stopping => StepPhase::Stopping,
            JobPhase::Stopped => StepPhase::Stopped,
            JobPhase::Completed => StepPhase::Completed,
            JobPhase::Error => StepPhase::Error,
        }
    }
}

/// Runtime state of one step, as held by the status table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRuntimeState {
    pub step_id: String,
    pub phase: StepPhase,
    pub progress_percent: u8,
    /// Last known result (synchronous body or job result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_handle: Option<JobHandle>,
    /// Bumped on every launch and every reset. Writes tagged with an older
    /// attempt are discarded.
    pub attempt: u64,
    pub updated_at: DateTime<Utc>,
}

impl StepRuntimeState {
    pub fn new(step_id: impl Into<String>, phase: StepPhase) -> Self {
        Self {
            step_id: step_id.into(),
            phase,
            progress_percent: 0,
            result: None,
            error_detail: None,
            active_handle: None,
            attempt: 0,
            updated_at: Utc::now(),
        }
    }

    /// Enforce the state invariants. Called by the table on every write.
    pub(crate) fn normalize(&mut self) {
        self.progress_percent = self.progress_percent.min(100);
        if matches!(self.phase, StepPhase::Error | StepPhase::Ready) {
            self.progress_percent = 0;
        }
        if !self.phase.is_active() {
            self.active_handle = None;
        }
    }
}

/// How the backend answered a start call.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchOutcome {
    /// The step ran synchronously; this is its final result.
    Immediate(Value),
    /// The step continues as a background job.
    Deferred(JobHandle),
}

impl LaunchOutcome {
    /// Classify a start response. A body carrying both a job id and a
    /// status address is a job handle; anything else is a final result and
    /// is kept verbatim.
    pub fn classify(body: Value) -> Self {
        let handle = body.as_object().and_then(|obj| {
            let job_id = field_str(obj, &["jobId", "job_id"])?;
            let status_address = field_str(obj, &["statusAddress", "status_address"])?;
            Some(JobHandle {
                job_id: job_id.to_string(),
                status_address: status_address.to_string(),
            })
        });

        match handle {
            Some(handle) => LaunchOutcome::Deferred(handle),
            None => LaunchOutcome::Immediate(body),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            LaunchOutcome::Immediate(_) => "immediate",
            LaunchOutcome::Deferred(_) => "deferred",
        }
    }
}

fn field_str<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Result of one step inside a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed {
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    Error {
        detail: String,
    },
    Stopped,
    Skipped {
        reason: String,
    },
}

/// Per-step report of a stop-all request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReport {
    pub step_id: String,
    pub stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pipeline coordinator state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    Running {
        step_index: usize,
    },
    Aborted,
    Finished,
}

/// One end-to-end pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(flatten)]
    pub state: PipelineState,
    pub is_running: bool,
    pub current_step_index: usize,
    /// Every attempted step's outcome, keyed by step id.
    pub aggregated_results: HashMap<String, StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}
