//! Pipeline lifecycle integration tests.
//!
//! These tests verify full pipeline runs with a mock backend:
//! - Sequencing and step index progression
//! - Abort on user stop
//! - Continue on step error
//! - Single-run guard and reset

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use enrich_core::{
    backend::{JobBackend, JobStatus},
    config::StepsConfig,
    testing::{fixtures, MockBackend},
    Orchestrator, OrchestratorError, PipelineRun, PipelineState, StepCatalog, StepOutcome,
    StepPhase,
};

const WORKFLOW: [&str; 5] = ["extract", "sync", "augment", "knowledge_tree", "insights"];

struct TestHarness {
    orchestrator: Orchestrator,
    backend: Arc<MockBackend>,
}

impl TestHarness {
    async fn new() -> Self {
        Self::with_catalog(StepCatalog::default_workflow(), StepsConfig::default()).await
    }

    async fn with_catalog(catalog: StepCatalog, steps: StepsConfig) -> Self {
        let backend = Arc::new(MockBackend::new());
        let orchestrator = Orchestrator::new(
            catalog,
            Arc::clone(&backend) as Arc<dyn JobBackend>,
            &fixtures::fast_config(),
            &steps,
        )
        .await
        .expect("Failed to build orchestrator");

        Self {
            orchestrator,
            backend,
        }
    }

    /// Every workflow step answers synchronously.
    async fn all_immediate(&self) {
        for id in WORKFLOW {
            self.backend
                .set_start_response(&format!("/api/steps/{}", id), json!({ "step": id }))
                .await;
        }
    }

    async fn wait_until_finished(&self) -> PipelineRun {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let run = self.orchestrator.pipeline_run().await;
                if !run.is_running {
                    return run;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Timed out waiting for pipeline run")
    }
}

#[tokio::test]
async fn test_full_run_finishes() {
    let h = TestHarness::new().await;
    h.all_immediate().await;

    let run = h.orchestrator.run_pipeline().await.unwrap();
    assert_eq!(run.state, PipelineState::Finished);
    assert!(!run.is_running);
    assert_eq!(run.current_step_index, 5);
    assert_eq!(run.aggregated_results.len(), 5);
    assert!(run.run_id.is_some());

    let starts = h.backend.recorded_starts().await;
    let paths: Vec<_> = starts.iter().map(|s| s.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "/api/steps/extract",
            "/api/steps/sync",
            "/api/steps/augment",
            "/api/steps/knowledge_tree",
            "/api/steps/insights",
        ]
    );
}

#[tokio::test]
async fn test_stop_at_step_two_aborts_run() {
    let h = TestHarness::new().await;
    h.all_immediate().await;
    h.backend.set_cancel_stops_job(true).await;
    h.backend
        .set_start_response("/api/steps/sync", fixtures::job_handle_body("J2"))
        .await;
    h.backend
        .set_status_sequence("/s/J2", vec![JobStatus::running(50)])
        .await;

    let started = h.orchestrator.start_pipeline().await.unwrap();
    assert!(started.is_running);
    assert_eq!(started.state, PipelineState::Running { step_index: 0 });

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let state = h.orchestrator.step_state("sync").await.unwrap();
            if state.active_handle.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sync never started its job");

    assert!(h.orchestrator.stop_step("sync").await.unwrap());

    let run = h.wait_until_finished().await;
    assert_eq!(run.state, PipelineState::Aborted);
    assert!(!run.is_running);
    assert_eq!(run.current_step_index, 1);
    assert_eq!(run.aggregated_results.len(), 2);
    assert_eq!(run.aggregated_results["sync"], StepOutcome::Stopped);

    // Steps 3 to 5 were never launched.
    assert_eq!(h.backend.start_count().await, 2);
    for id in ["augment", "knowledge_tree", "insights"] {
        assert_eq!(
            h.orchestrator.step_state(id).await.unwrap().phase,
            StepPhase::Ready
        );
    }
}

#[tokio::test]
async fn test_error_at_step_two_continues() {
    let h = TestHarness::new().await;
    h.all_immediate().await;
    h.backend
        .set_start_response("/api/steps/sync", fixtures::job_handle_body("J2"))
        .await;
    h.backend
        .set_status_sequence(
            "/s/J2",
            vec![JobStatus::running(30), JobStatus::error("mailbox locked")],
        )
        .await;

    let run = h.orchestrator.run_pipeline().await.unwrap();
    assert_eq!(run.state, PipelineState::Finished);
    assert_eq!(run.aggregated_results.len(), 5);
    assert_eq!(
        run.aggregated_results["sync"],
        StepOutcome::Error {
            detail: "mailbox locked".to_string()
        }
    );
    assert_eq!(h.backend.start_count().await, 5);

    let sync = h.orchestrator.step_state("sync").await.unwrap();
    assert_eq!(sync.phase, StepPhase::Error);
    assert_eq!(sync.progress_percent, 0);
}

#[tokio::test]
async fn test_synchronous_middle_step_advances_index() {
    let h = TestHarness::with_catalog(fixtures::three_step_catalog(), StepsConfig::default()).await;
    h.backend
        .set_start_response("/steps/alpha", fixtures::job_handle_body("J1"))
        .await;
    h.backend
        .set_status_sequence(
            "/s/J1",
            vec![JobStatus::running(50), JobStatus::completed(json!({ "a": 1 }))],
        )
        .await;
    h.backend
        .set_start_response("/steps/beta", json!({ "b": 2 }))
        .await;
    h.backend
        .set_start_response("/steps/gamma", fixtures::job_handle_body("J3"))
        .await;
    h.backend
        .set_status_sequence("/s/J3", vec![JobStatus::completed(json!({ "c": 3 }))])
        .await;

    let mut feed = h.orchestrator.subscribe_pipeline();
    let run = h.orchestrator.run_pipeline().await.unwrap();
    assert_eq!(run.current_step_index, 3);
    assert!(!run.is_running);
    assert_eq!(
        run.aggregated_results["beta"],
        StepOutcome::Completed {
            result: Some(json!({ "b": 2 }))
        }
    );

    let mut indices: Vec<usize> = Vec::new();
    while let Ok(update) = feed.try_recv() {
        if indices.last() != Some(&update.current_step_index) {
            indices.push(update.current_step_index);
        }
    }
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_disabled_steps_are_skipped() {
    let steps = StepsConfig {
        disabled: vec!["augment".to_string()],
        ..Default::default()
    };
    let h = TestHarness::with_catalog(StepCatalog::default_workflow(), steps).await;
    h.all_immediate().await;

    let run = h.orchestrator.run_pipeline().await.unwrap();
    assert_eq!(run.state, PipelineState::Finished);
    assert_eq!(run.aggregated_results.len(), 5);
    assert!(matches!(
        run.aggregated_results["augment"],
        StepOutcome::Skipped { .. }
    ));
    assert_eq!(h.backend.start_count().await, 4);
}

#[tokio::test]
async fn test_only_one_run_at_a_time() {
    let h = TestHarness::new().await;
    h.all_immediate().await;
    h.backend
        .set_start_response("/api/steps/extract", fixtures::job_handle_body("J1"))
        .await;
    h.backend
        .set_status_sequence("/s/J1", vec![JobStatus::running(5)])
        .await;

    h.orchestrator.start_pipeline().await.unwrap();
    let err = h.orchestrator.start_pipeline().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::PipelineAlreadyRunning));

    h.orchestrator.reset_pipeline().await;
}

#[tokio::test]
async fn test_reset_during_run() {
    let h = TestHarness::new().await;
    h.all_immediate().await;
    h.backend
        .set_start_response("/api/steps/sync", fixtures::job_handle_body("J2"))
        .await;
    h.backend
        .set_status_sequence("/s/J2", vec![JobStatus::running(5)])
        .await;

    h.orchestrator.start_pipeline().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let run = h.orchestrator.reset_pipeline().await;
    assert_eq!(run.state, PipelineState::Idle);
    assert!(!run.is_running);
    assert!(run.aggregated_results.is_empty());

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.backend.start_count().await, 2);
    for state in h.orchestrator.step_states().await {
        assert_eq!(state.phase, StepPhase::Ready);
    }

    // A new run can start right away.
    h.all_immediate().await;
    let run = h.orchestrator.run_pipeline().await.unwrap();
    assert_eq!(run.state, PipelineState::Finished);
}
