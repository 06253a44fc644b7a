//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for job polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Wait between two status polls of the same job (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Consecutive failed status requests tolerated before the poll loop
    /// gives up and marks the step as errored.
    #[serde(default = "default_max_poll_failures")]
    pub max_consecutive_poll_failures: u32,
}

fn default_poll_interval() -> u64 {
    2000 // 2 seconds
}

fn default_max_poll_failures() -> u32 {
    3
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_consecutive_poll_failures: default_max_poll_failures(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.max_consecutive_poll_failures, 3);
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: OrchestratorConfig = toml::from_str("").unwrap();
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.max_consecutive_poll_failures, 3);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            poll_interval_ms = 250
            max_consecutive_poll_failures = 10
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.max_consecutive_poll_failures, 10);
    }
}
