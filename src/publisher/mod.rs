//! Publish targets
//!
//! The last step of the pipeline: hand an approved draft to the system that
//! makes it public (or stores it as a draft when `make_live` is off).

pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Attachment, Draft};
use crate::utils::webhook::WebhookFailure;

pub use webhook::WebhookPublisher;

/// Result type for publishing
pub type PublishResult<T> = Result<T, PublishError>;

/// Errors raised by a publish target
#[derive(Debug, Error)]
pub enum PublishError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Target refused the content
    #[error("Publish rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Target answered with something unexpected
    #[error("Invalid publish response: {0}")]
    InvalidResponse(String),

    /// Invalid target configuration
    #[error("Invalid publisher configuration: {0}")]
    InvalidConfig(String),
}

impl PublishError {
    /// Whether retrying later could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<WebhookFailure> for PublishError {
    fn from(err: WebhookFailure) -> Self {
        match err {
            WebhookFailure::InvalidConfig(msg) => Self::InvalidConfig(msg),
            WebhookFailure::Transport(e) => Self::Http(e),
            WebhookFailure::Status { status, body } => Self::Rejected {
                status: status.as_u16(),
                body,
            },
        }
    }
}

/// Content handed to a publish target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub title: String,
    pub body: String,
    pub attachment: Option<Attachment>,
    /// Publish publicly (`true`) or store as a draft (`false`)
    pub make_live: bool,
}

impl PublishRequest {
    /// Build a request from a draft
    pub fn new(draft: &Draft, attachment: Option<&Attachment>, make_live: bool) -> Self {
        Self {
            title: draft.title.clone(),
            body: draft.body.clone(),
            attachment: attachment.cloned(),
            make_live,
        }
    }
}

/// Identifier and link of published content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub link: String,
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unexpected id: {other}"))),
    }
}

/// System that makes approved content public
#[async_trait]
pub trait PublishTarget: Send + Sync {
    /// Get the target name
    fn name(&self) -> &str;

    /// Publish one piece of content
    async fn publish(&self, request: &PublishRequest) -> PublishResult<PublishReceipt>;
}
