//! JSON-over-HTTP webhook client
//!
//! Shared by the webhook publisher and the webhook operator channel: bearer
//! auth, custom headers, per-request timeout and retry with exponential
//! backoff on transport errors and 5xx responses. 4xx responses are not
//! retried.

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use super::retry::{with_retry_if, RetryConfig};

/// Webhook endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Endpoint URL
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum retry attempts on failure
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Base backoff delay in milliseconds
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    1000
}

impl WebhookConfig {
    /// Create a new webhook configuration
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
        }
    }

    /// Set authentication token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set max retries and the base backoff delay
    pub fn with_retries(mut self, max_retries: u32, base_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay_ms = base_delay_ms;
        self
    }

    /// Retry policy derived from this configuration
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(self.max_retries, self.retry_base_delay_ms, 30_000)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Webhook URL cannot be empty".to_string());
        }

        let parsed = url::Url::parse(&self.url).map_err(|e| format!("Invalid webhook URL: {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err("Webhook URL must start with http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Failure of a webhook call after retries
#[derive(Debug, Error)]
pub enum WebhookFailure {
    /// Invalid configuration
    #[error("Invalid webhook configuration: {0}")]
    InvalidConfig(String),

    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl WebhookFailure {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidConfig(_) => false,
            Self::Transport(_) => true,
            Self::Status { status, .. } => status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// HTTP client bound to one webhook endpoint
#[derive(Debug, Clone)]
pub struct WebhookClient {
    config: WebhookConfig,
    client: Client,
}

impl WebhookClient {
    /// Create a client; fails on invalid configuration
    pub fn new(config: WebhookConfig) -> Result<Self, WebhookFailure> {
        config.validate().map_err(WebhookFailure::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Configuration this client was built from
    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// POST a JSON payload to `url` (relative paths are joined onto the base)
    /// and return the successful response
    pub async fn post_json<P: Serialize + ?Sized>(
        &self,
        path: Option<&str>,
        payload: &P,
    ) -> Result<Response, WebhookFailure> {
        let url = match path {
            Some(path) => join_url(&self.config.url, path),
            None => self.config.url.clone(),
        };

        with_retry_if(
            &self.config.retry_config(),
            || self.send_once(&url, payload),
            WebhookFailure::is_retryable,
        )
        .await
    }

    async fn send_once<P: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &P,
    ) -> Result<Response, WebhookFailure> {
        let mut request = self.client.post(url);

        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.json(payload).send().await?;
        let status = response.status();

        if status.is_success() {
            tracing::debug!(url = %url, status = %status, "Webhook delivered");
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());
        Err(WebhookFailure::Status { status, body })
    }

    /// Check that the endpoint is reachable
    pub async fn is_reachable(&self) -> bool {
        match self.client.head(&self.config.url).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(url = %self.config.url, error = %e, "Webhook health check failed");
                false
            }
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
