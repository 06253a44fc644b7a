//! Types for talking to the remote step backend.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::steps::Operation;

/// Transport-level failures when calling the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BackendError {
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else if e.is_connect() {
            BackendError::ConnectionFailed(e.to_string())
        } else if e.is_decode() {
            BackendError::InvalidResponse(e.to_string())
        } else {
            BackendError::Internal(e.to_string())
        }
    }
}

/// Phase of a remote job as reported by the status call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Running,
    Stopping,
    Stopped,
    Completed,
    Error,
}

impl JobPhase {
    /// Terminal phases never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Stopped | JobPhase::Completed | JobPhase::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Queued => "queued",
            JobPhase::Running => "running",
            JobPhase::Stopping => "stopping",
            JobPhase::Stopped => "stopped",
            JobPhase::Completed => "completed",
            JobPhase::Error => "error",
        }
    }
}

/// Payload returned by each status poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub phase: JobPhase,
    #[serde(
        default,
        alias = "progress_percent",
        deserialize_with = "deserialize_percent"
    )]
    pub progress_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(
        default,
        alias = "error_detail",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_detail: Option<String>,
}

impl JobStatus {
    pub fn new(phase: JobPhase, progress_percent: u8) -> Self {
        Self {
            phase,
            progress_percent: progress_percent.min(100),
            result: None,
            error_detail: None,
        }
    }

    pub fn running(progress_percent: u8) -> Self {
        Self::new(JobPhase::Running, progress_percent)
    }

    pub fn completed(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::new(JobPhase::Completed, 100)
        }
    }

    pub fn stopped() -> Self {
        Self::new(JobPhase::Stopped, 0)
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            error_detail: Some(detail.into()),
            ..Self::new(JobPhase::Error, 0)
        }
    }
}

/// Accepts any JSON number and clamps it into 0..=100.
fn deserialize_percent<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if raw.is_nan() {
        return Ok(0);
    }
    Ok(raw.clamp(0.0, 100.0).round() as u8)
}

/// Handle to a server-side job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_id: String,
    /// Where to poll: absolute URL or path relative to the backend.
    pub status_address: String,
}

/// The three remote calls the orchestrator needs.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Start a step. The returned body is either a final result or carries
    /// a job handle; classifying it is the launcher's job.
    async fn start(&self, operation: &Operation, payload: &Value) -> Result<Value, BackendError>;

    /// Query the current status of a job.
    async fn status(&self, status_address: &str) -> Result<JobStatus, BackendError>;

    /// Request cancellation. `Ok(false)` means the backend refused.
    async fn cancel(&self, handle: &JobHandle) -> Result<bool, BackendError>;
}
