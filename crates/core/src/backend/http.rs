//! HTTP implementation of the step backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::BackendConfig;
use crate::steps::{HttpMethod, Operation};

use super::{BackendError, JobBackend, JobHandle, JobStatus};

/// Talks to the enrichment backend over HTTP/JSON.
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
}

/// Body of the cancellation response.
#[derive(Debug, Deserialize)]
struct CancelResponse {
    #[serde(default)]
    accepted: bool,
}

impl HttpBackend {
    /// Create a new HTTP backend.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| BackendError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Resolve a path or absolute URL against the base URL.
    fn resolve(&self, address: &str) -> String {
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else if address.starts_with('/') {
            format!("{}{}", self.base_url(), address)
        } else {
            format!("{}/{}", self.base_url(), address)
        }
    }

    fn cancel_url(&self, job_id: &str) -> String {
        let path = self
            .config
            .cancel_path
            .replace("{job_id}", &urlencoding::encode(job_id));
        self.resolve(&path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.api_token.as_deref() {
            Some(token) if !token.is_empty() => request.bearer_auth(token),
            _ => request,
        }
    }

    /// Send a request and decode a JSON body from a 2xx response.
    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let text = response.text().await.map_err(BackendError::from_reqwest)?;
        serde_json::from_str(&text).map_err(|e| {
            BackendError::InvalidResponse(format!(
                "{}: {}",
                e,
                text.chars().take(100).collect::<String>()
            ))
        })
    }
}

#[async_trait]
impl JobBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn start(&self, operation: &Operation, payload: &Value) -> Result<Value, BackendError> {
        let url = self.resolve(&operation.path);
        debug!("{} {}", operation.method.as_str(), url);

        let request = match operation.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url).json(payload),
            HttpMethod::Put => self.client.put(&url).json(payload),
        };
        self.send_json(request).await
    }

    async fn status(&self, status_address: &str) -> Result<JobStatus, BackendError> {
        let url = self.resolve(status_address);
        self.send_json(self.client.get(&url)).await
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<bool, BackendError> {
        let url = self.cancel_url(&handle.job_id);
        debug!("POST {}", url);
        let response: CancelResponse = self.send_json(self.client.post(&url)).await?;
        Ok(response.accepted)
    }
}
