//! Testing utilities and a mock backend.
//!
//! Lets the orchestrator and the HTTP API be exercised end to end without a
//! real enrichment backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use enrich_core::testing::{fixtures, MockBackend};
//!
//! let backend = MockBackend::new();
//! backend.set_start_response("/steps/alpha", fixtures::job_handle_body("J1")).await;
//! backend.set_status_sequence("/s/J1", vec![JobStatus::running(40)]).await;
//! ```

mod mock_backend;

pub use mock_backend::{MockBackend, RecordedStart};

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::{json, Value};

    use crate::backend::JobHandle;
    use crate::orchestrator::OrchestratorConfig;
    use crate::steps::{Operation, OptionSpec, StepCatalog, StepDescriptor};

    /// Status address the fixtures use for `job_id`.
    pub fn status_address(job_id: &str) -> String {
        format!("/s/{}", job_id)
    }

    pub fn job_handle(job_id: &str) -> JobHandle {
        JobHandle {
            job_id: job_id.to_string(),
            status_address: status_address(job_id),
        }
    }

    /// Start response body that carries a job handle.
    pub fn job_handle_body(job_id: &str) -> Value {
        json!({
            "jobId": job_id,
            "statusAddress": status_address(job_id),
        })
    }

    /// A step posting to `/steps/<id>` with one integer option.
    pub fn step(id: &str) -> StepDescriptor {
        StepDescriptor {
            id: id.to_string(),
            name: format!("Step {}", id),
            description: format!("Test step {}", id),
            operation: Operation::post(format!("/steps/{}", id)),
            default_payload: json!({}),
            config_schema: vec![OptionSpec::integer("limit", "Item limit", 1, 100, 10)],
        }
    }

    /// Catalog of `alpha`, `beta`, `gamma`.
    pub fn three_step_catalog() -> StepCatalog {
        StepCatalog::new(vec![step("alpha"), step("beta"), step("gamma")])
    }

    /// Polls every few milliseconds so tests finish quickly.
    pub fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval_ms: 5,
            max_consecutive_poll_failures: 3,
        }
    }
}
