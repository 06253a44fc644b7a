//! Mock job backend for testing.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::backend::{BackendError, JobBackend, JobHandle, JobStatus};
use crate::steps::Operation;

/// A recorded start call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedStart {
    /// Operation path that was called.
    pub path: String,
    /// Request body that was sent.
    pub payload: Value,
    /// When the call was made.
    pub timestamp: chrono::DateTime<Utc>,
}

/// Scripted answers, served front to back. The last one repeats forever.
type Script<T> = VecDeque<Result<T, BackendError>>;

fn next_in<T: Clone>(script: &mut Script<T>) -> Option<Result<T, BackendError>> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

/// Mock implementation of the JobBackend trait.
///
/// Provides controllable behavior for testing:
/// - Script start responses per operation path
/// - Script status sequences per status address
/// - Accept, reject or fail cancellations per job id
///
/// # Example
///
/// ```rust,ignore
/// let backend = MockBackend::new();
///
/// backend.set_start_response("/api/steps/extract", fixtures::job_handle_body("J1")).await;
/// backend
///     .set_status_sequence("/s/J1", vec![JobStatus::running(40), JobStatus::completed(json!({}))])
///     .await;
///
/// // ... run the step ...
///
/// assert_eq!(backend.start_count().await, 1);
/// ```
#[derive(Debug, Default)]
pub struct MockBackend {
    /// Start responses by operation path.
    start_responses: Arc<RwLock<HashMap<String, Script<Value>>>>,
    /// Status responses by status address.
    statuses: Arc<RwLock<HashMap<String, Script<JobStatus>>>>,
    /// Number of status requests per address.
    status_counts: Arc<RwLock<HashMap<String, usize>>>,
    /// Cancel responses by job id. Unscripted jobs accept.
    cancel_responses: Arc<RwLock<HashMap<String, Result<bool, BackendError>>>>,
    /// When set, an accepted cancel makes the job report `stopped`.
    cancel_stops_job: Arc<RwLock<bool>>,
    /// Delay applied to every start call.
    start_delay: Arc<RwLock<Option<Duration>>>,
    starts: Arc<RwLock<Vec<RecordedStart>>>,
    cancels: Arc<RwLock<Vec<JobHandle>>>,
}

impl MockBackend {
    /// Create a new mock backend with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every start call on `path` with `body`.
    pub async fn set_start_response(&self, path: &str, body: Value) {
        self.start_responses
            .write()
            .await
            .insert(path.to_string(), VecDeque::from([Ok(body)]));
    }

    /// Fail every start call on `path` with `error`.
    pub async fn set_start_error(&self, path: &str, error: BackendError) {
        self.start_responses
            .write()
            .await
            .insert(path.to_string(), VecDeque::from([Err(error)]));
    }

    /// Queue one more start response for `path`.
    pub async fn push_start_response(&self, path: &str, body: Value) {
        self.start_responses
            .write()
            .await
            .entry(path.to_string())
            .or_default()
            .push_back(Ok(body));
    }

    /// Delay every start call, to hold a launch in flight.
    pub async fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.write().await = Some(delay);
    }

    /// Replace the status script of `address`.
    pub async fn set_status_sequence(&self, address: &str, statuses: Vec<JobStatus>) {
        self.statuses.write().await.insert(
            address.to_string(),
            statuses.into_iter().map(Ok).collect(),
        );
    }

    /// Append a status to the script of `address`.
    pub async fn push_status(&self, address: &str, status: JobStatus) {
        self.statuses
            .write()
            .await
            .entry(address.to_string())
            .or_default()
            .push_back(Ok(status));
    }

    /// Append a failed status request to the script of `address`.
    pub async fn push_status_error(&self, address: &str, error: BackendError) {
        self.statuses
            .write()
            .await
            .entry(address.to_string())
            .or_default()
            .push_back(Err(error));
    }

    /// Answer cancel requests for `job_id` with `response`.
    pub async fn set_cancel_response(&self, job_id: &str, response: Result<bool, BackendError>) {
        self.cancel_responses
            .write()
            .await
            .insert(job_id.to_string(), response);
    }

    /// Make accepted cancels switch the job's status to `stopped`.
    pub async fn set_cancel_stops_job(&self, enabled: bool) {
        *self.cancel_stops_job.write().await = enabled;
    }

    /// Get all recorded start calls.
    pub async fn recorded_starts(&self) -> Vec<RecordedStart> {
        self.starts.read().await.clone()
    }

    pub async fn start_count(&self) -> usize {
        self.starts.read().await.len()
    }

    /// Number of status requests made against `address`.
    pub async fn status_count(&self, address: &str) -> usize {
        self.status_counts
            .read()
            .await
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    /// Handles of every cancel request received.
    pub async fn recorded_cancels(&self) -> Vec<JobHandle> {
        self.cancels.read().await.clone()
    }

    pub async fn cancel_count(&self) -> usize {
        self.cancels.read().await.len()
    }
}

#[async_trait]
impl JobBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(&self, operation: &Operation, payload: &Value) -> Result<Value, BackendError> {
        self.starts.write().await.push(RecordedStart {
            path: operation.path.clone(),
            payload: payload.clone(),
            timestamp: Utc::now(),
        });

        let delay = *self.start_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut responses = self.start_responses.write().await;
        responses
            .get_mut(&operation.path)
            .and_then(next_in)
            .unwrap_or_else(|| {
                Err(BackendError::Internal(format!(
                    "no start response scripted for {}",
                    operation.path
                )))
            })
    }

    async fn status(&self, status_address: &str) -> Result<JobStatus, BackendError> {
        *self
            .status_counts
            .write()
            .await
            .entry(status_address.to_string())
            .or_default() += 1;

        let mut statuses = self.statuses.write().await;
        statuses
            .get_mut(status_address)
            .and_then(next_in)
            .unwrap_or_else(|| {
                Err(BackendError::InvalidResponse(format!(
                    "no status scripted for {}",
                    status_address
                )))
            })
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<bool, BackendError> {
        self.cancels.write().await.push(handle.clone());

        let response = self
            .cancel_responses
            .read()
            .await
            .get(&handle.job_id)
            .cloned()
            .unwrap_or(Ok(true));

        if matches!(response, Ok(true)) && *self.cancel_stops_job.read().await {
            self.set_status_sequence(&handle.status_address, vec![JobStatus::stopped()])
                .await;
        }
        response
    }
}
