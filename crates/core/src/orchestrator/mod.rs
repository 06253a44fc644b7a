//! Job orchestration engine.
//!
//! Steps are launched against a backend and, when the backend answers with a
//! job handle, polled until the job is terminal:
//! - **Launch**: one in-flight job per step, claimed in the status table
//! - **Polling**: one independent watcher task per running job
//! - **Pipeline**: sequential over the catalog, aborted only by a user stop

mod config;
mod controller;
mod engine;
mod launcher;
mod pipeline;
mod poller;
mod runner;
mod status_table;
mod types;

pub use config::OrchestratorConfig;
pub use controller::JobController;
pub use engine::Orchestrator;
pub use launcher::{JobLauncher, Launched};
pub use pipeline::PipelineCoordinator;
pub use poller::{JobPoller, Liveness, PollOutcome};
pub use runner::StepRunner;
pub use status_table::StepStatusTable;
pub use types::{
    CancelReport, LaunchOutcome, OrchestratorError, PipelineRun, PipelineState, StepOutcome,
    StepPhase, StepRuntimeState,
};
