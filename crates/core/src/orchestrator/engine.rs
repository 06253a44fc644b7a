//! The orchestration engine as seen by its caller.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::backend::JobBackend;
use crate::config::StepsConfig;
use crate::steps::{StepCatalog, StepConfig, StepConfigStore, StepDescriptor};

use super::config::OrchestratorConfig;
use super::controller::JobController;
use super::launcher::JobLauncher;
use super::pipeline::PipelineCoordinator;
use super::poller::JobPoller;
use super::runner::StepRunner;
use super::status_table::StepStatusTable;
use super::types::{CancelReport, OrchestratorError, PipelineRun, StepRuntimeState};

/// Wires the catalog, config store, status table, runner, controller and
/// pipeline coordinator around one backend.
pub struct Orchestrator {
    catalog: Arc<StepCatalog>,
    config_store: Arc<StepConfigStore>,
    table: Arc<StepStatusTable>,
    runner: Arc<StepRunner>,
    controller: JobController,
    pipeline: Arc<PipelineCoordinator>,
}

impl Orchestrator {
    /// Build an engine. Initial option values from `steps` go through the
    /// same validating setter as runtime updates.
    pub async fn new(
        catalog: StepCatalog,
        backend: Arc<dyn JobBackend>,
        config: &OrchestratorConfig,
        steps: &StepsConfig,
    ) -> Result<Self, OrchestratorError> {
        let catalog = Arc::new(catalog);
        let config_store = Arc::new(StepConfigStore::new(Arc::clone(&catalog)));
        for (step_id, values) in &steps.options {
            config_store.set_config(step_id, values).await?;
        }

        let table = Arc::new(StepStatusTable::new(&catalog, &steps.disabled));
        let launcher = JobLauncher::new(
            Arc::clone(&catalog),
            Arc::clone(&config_store),
            Arc::clone(&backend),
            Arc::clone(&table),
        );
        let poller = JobPoller::new(
            Arc::clone(&backend),
            Arc::clone(&table),
            config.poll_interval(),
            config.max_consecutive_poll_failures,
        );
        let runner = Arc::new(StepRunner::new(launcher, poller, Arc::clone(&table)));
        let controller = JobController::new(Arc::clone(&backend), Arc::clone(&table));
        let pipeline = Arc::new(PipelineCoordinator::new(
            Arc::clone(&catalog),
            Arc::clone(&table),
            Arc::clone(&runner),
        ));

        info!(
            "Orchestrator ready: {} steps, backend {}, poll interval {}ms",
            catalog.len(),
            backend.name(),
            config.poll_interval_ms
        );

        Ok(Self {
            catalog,
            config_store,
            table,
            runner,
            controller,
            pipeline,
        })
    }

    pub fn list_steps(&self) -> &[StepDescriptor] {
        self.catalog.list_steps()
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    pub async fn get_config(&self, step_id: &str) -> Result<StepConfig, OrchestratorError> {
        Ok(self.config_store.get_config(step_id).await?)
    }

    pub async fn set_config(
        &self,
        step_id: &str,
        values: &Map<String, Value>,
    ) -> Result<StepConfig, OrchestratorError> {
        Ok(self.config_store.set_config(step_id, values).await?)
    }

    pub async fn step_state(&self, step_id: &str) -> Result<StepRuntimeState, OrchestratorError> {
        self.table
            .get(step_id)
            .await
            .ok_or_else(|| OrchestratorError::UnknownStep(step_id.to_string()))
    }

    /// All step states in catalog order.
    pub async fn step_states(&self) -> Vec<StepRuntimeState> {
        self.table.snapshot().await
    }

    /// Launch one step outside any pipeline run. Returns once the backend
    /// answered; a deferred job is polled in the background.
    pub async fn run_step(&self, step_id: &str) -> Result<StepRuntimeState, OrchestratorError> {
        self.runner.run_step(step_id).await
    }

    pub async fn stop_step(&self, step_id: &str) -> Result<bool, OrchestratorError> {
        self.controller.cancel(step_id).await
    }

    pub async fn stop_all(&self) -> Vec<CancelReport> {
        self.controller.cancel_all().await
    }

    /// Run the whole pipeline and wait for it to end.
    pub async fn run_pipeline(&self) -> Result<PipelineRun, OrchestratorError> {
        self.pipeline.run_pipeline().await
    }

    /// Start a pipeline run in the background and return its initial state.
    pub async fn start_pipeline(&self) -> Result<PipelineRun, OrchestratorError> {
        let run_id = self.pipeline.begin().await?;
        let started = self.pipeline.current().await;

        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move {
            match pipeline.drive(run_id).await {
                Ok(_) | Err(OrchestratorError::PipelineReset) => {}
                Err(e) => error!("Pipeline run {} failed: {}", run_id, e),
            }
        });

        Ok(started)
    }

    pub async fn reset_pipeline(&self) -> PipelineRun {
        self.pipeline.reset().await
    }

    pub async fn pipeline_run(&self) -> PipelineRun {
        self.pipeline.current().await
    }

    pub fn subscribe_steps(&self) -> broadcast::Receiver<StepRuntimeState> {
        self.table.subscribe()
    }

    pub fn subscribe_pipeline(&self) -> broadcast::Receiver<PipelineRun> {
        self.pipeline.subscribe()
    }

    /// Stop every poll loop. Step state and remote jobs are left as they are.
    pub async fn shutdown(&self) {
        info!("Shutting down orchestrator");
        self.runner.shutdown().await;
    }
}
