pub mod backend;
pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod steps;
pub mod testing;

pub use backend::{BackendError, HttpBackend, JobBackend, JobHandle, JobPhase, JobStatus};
pub use config::{
    load_config, load_config_from_str, validate_config, BackendConfig, Config, ConfigError,
    SanitizedConfig, ServerConfig, StepsConfig,
};
pub use orchestrator::{
    CancelReport, LaunchOutcome, Orchestrator, OrchestratorConfig, OrchestratorError, PipelineRun,
    PipelineState, StepOutcome, StepPhase, StepRuntimeState,
};
pub use steps::{StepCatalog, StepConfig, StepConfigError, StepConfigStore, StepDescriptor};
