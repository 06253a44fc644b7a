use super::{types::Config, ConfigError};
use crate::steps::StepCatalog;

/// Validate configuration against the step catalog it will run with.
///
/// Checks:
/// - Server port is not 0
/// - Backend URL is an absolute http(s) URL
/// - Cancel path contains the `{job_id}` placeholder
/// - Poll interval and failure bound are non-zero
/// - Every step id referenced under `[steps]` exists in the catalog
pub fn validate_config(config: &Config, catalog: &StepCatalog) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let url = reqwest::Url::parse(&config.backend.url).map_err(|e| {
        ConfigError::ValidationError(format!(
            "backend.url '{}' is not a valid URL: {}",
            config.backend.url, e
        ))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::ValidationError(format!(
            "backend.url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if !config.backend.cancel_path.contains("{job_id}") {
        return Err(ConfigError::ValidationError(
            "backend.cancel_path must contain {job_id}".to_string(),
        ));
    }

    if config.orchestrator.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.orchestrator.max_consecutive_poll_failures == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_consecutive_poll_failures cannot be 0".to_string(),
        ));
    }

    let referenced = config
        .steps
        .disabled
        .iter()
        .chain(config.steps.options.keys());
    for step_id in referenced {
        if !catalog.contains(step_id) {
            return Err(ConfigError::ValidationError(format!(
                "unknown step '{}' in [steps]",
                step_id
            )));
        }
    }

    Ok(())
}
