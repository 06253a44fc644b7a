use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub steps: StepsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Remote step backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL (e.g., "http://localhost:5000")
    pub url: String,
    /// Bearer token sent with every request
    #[serde(default)]
    pub api_token: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Cancellation endpoint; `{job_id}` is replaced by the encoded job id
    #[serde(default = "default_cancel_path")]
    pub cancel_path: String,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_token: None,
            timeout_secs: default_timeout(),
            cancel_path: default_cancel_path(),
        }
    }
}

fn default_timeout() -> u32 {
    30
}

fn default_cancel_path() -> String {
    "/api/jobs/{job_id}/cancel".to_string()
}

/// Step-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StepsConfig {
    /// Steps shown as disabled and skipped by pipeline runs
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Initial option values per step, validated like any other write
    #[serde(default)]
    pub options: HashMap<String, Map<String, Value>>,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub backend: SanitizedBackendConfig,
    pub orchestrator: OrchestratorConfig,
    pub steps: StepsConfig,
}

/// Sanitized backend config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedBackendConfig {
    pub url: String,
    pub api_token_configured: bool,
    pub timeout_secs: u32,
    pub cancel_path: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            backend: SanitizedBackendConfig {
                url: config.backend.url.clone(),
                api_token_configured: config
                    .backend
                    .api_token
                    .as_ref()
                    .is_some_and(|t| !t.is_empty()),
                timeout_secs: config.backend.timeout_secs,
                cancel_path: config.backend.cancel_path.clone(),
            },
            orchestrator: config.orchestrator.clone(),
            steps: config.steps.clone(),
        }
    }
}
