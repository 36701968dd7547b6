//! Content generation
//!
//! Turns a topic into a draft. The queue calls [`ContentGenerator::generate`]
//! once per item and the approval gate calls it again on "regenerate".

pub mod llm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Attachment, Draft};

pub use llm::{LlmConfig, LlmGenerator};

/// Result type for generation
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Errors raised while generating content
#[derive(Debug, Error)]
pub enum GenerationError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("Generator returned {status}: {body}")]
    Backend { status: u16, body: String },

    /// Backend answer could not be understood
    #[error("Invalid generator response: {0}")]
    InvalidResponse(String),

    /// Backend reported an error in its result
    #[error("Generation failed: {0}")]
    Rejected(String),

    /// Backend produced an empty body
    #[error("Generator produced an empty draft for '{topic}'")]
    EmptyDraft { topic: String },

    /// Invalid generator configuration
    #[error("Invalid generator configuration: {0}")]
    InvalidConfig(String),
}

impl GenerationError {
    /// Whether retrying later could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Backend { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Raw generator output
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub draft: Draft,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    /// Error reported by the backend alongside (or instead of) content
    #[serde(default)]
    pub error: Option<String>,
}

impl GeneratedContent {
    /// Content with just a draft
    pub fn new(draft: Draft) -> Self {
        Self {
            draft,
            attachment: None,
            error: None,
        }
    }

    /// Attach media
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Reject results that carry an error or have an empty body
    pub fn into_checked(self, topic: &str) -> GenerationResult<(Draft, Option<Attachment>)> {
        if let Some(error) = self.error {
            return Err(GenerationError::Rejected(error));
        }
        if self.draft.is_blank() {
            return Err(GenerationError::EmptyDraft {
                topic: topic.to_string(),
            });
        }
        Ok((self.draft, self.attachment))
    }
}

/// Produces drafts from topics
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Get the generator name
    fn name(&self) -> &str;

    /// Generate content for a topic
    async fn generate(&self, topic: &str) -> GenerationResult<GeneratedContent>;

    /// Check if the backend is reachable
    async fn is_available(&self) -> bool {
        true
    }
}
