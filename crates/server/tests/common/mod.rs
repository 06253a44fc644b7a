//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a mock backend injected, enabling E2E testing of the HTTP API
//! without a real enrichment backend.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use enrich_core::{
    testing::MockBackend, BackendConfig, Config, JobBackend, Orchestrator, ServerConfig,
    StepCatalog, StepsConfig,
};
use enrich_server::state::AppState;

/// Re-export fixtures for test convenience
pub use enrich_core::testing::fixtures;

/// Test fixture for E2E testing with a mock backend.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_run_step() {
///     let fixture = TestFixture::new().await;
///     fixture.backend.set_start_response("/api/steps/sync", json!({})).await;
///
///     let response = fixture.post("/api/v1/steps/sync/run", json!({})).await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock backend - script start, status and cancel responses
    pub backend: Arc<MockBackend>,
    /// The orchestrator behind the router
    pub orchestrator: Arc<Orchestrator>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture over the default workflow.
    pub async fn new() -> Self {
        Self::with_steps(StepsConfig::default()).await
    }

    /// Create a test fixture with custom step settings.
    pub async fn with_steps(steps: StepsConfig) -> Self {
        let backend = Arc::new(MockBackend::new());

        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            backend: BackendConfig::new("http://backend.test"),
            orchestrator: fixtures::fast_config(),
            steps,
        };

        let orchestrator = Arc::new(
            Orchestrator::new(
                StepCatalog::default_workflow(),
                Arc::clone(&backend) as Arc<dyn JobBackend>,
                &config.orchestrator,
                &config.steps,
            )
            .await
            .expect("Failed to build orchestrator"),
        );

        let state = Arc::new(AppState::new(config, Arc::clone(&orchestrator)));
        let router = enrich_server::api::create_router(state);

        Self {
            router,
            backend,
            orchestrator,
        }
    }

    /// Script `step_id` to start job `job_id` reporting `statuses`.
    pub async fn deferred(&self, step_id: &str, job_id: &str, statuses: Vec<enrich_core::JobStatus>) {
        self.backend
            .set_start_response(
                &format!("/api/steps/{}", step_id),
                fixtures::job_handle_body(job_id),
            )
            .await;
        self.backend
            .set_status_sequence(&fixtures::status_address(job_id), statuses)
            .await;
    }

    /// Poll `path` until `predicate` holds on the JSON body.
    pub async fn wait_for<F>(&self, path: &str, predicate: F) -> TestResponse
    where
        F: Fn(&Value) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let response = self.get(path).await;
                if predicate(&response.body) {
                    return response;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Timed out waiting for condition")
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).to_string()))
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
