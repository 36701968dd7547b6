//! Operator channels for human approval
//!
//! An operator channel shows a draft to a human with a set of decision
//! controls and carries the human's replies back. Outbound calls go through
//! [`OperatorChannel`]; inbound replies are delivered as [`ChannelEvent`]s into
//! a [`ReplyInbox`](crate::approval::ReplyInbox), which correlates them with
//! the approval gate's pending question.

pub mod console;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Attachment, Decision, Draft};
use crate::utils::webhook::WebhookFailure;

pub use console::ConsoleChannel;
pub use webhook::WebhookChannel;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur during channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid channel configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Channel temporarily unavailable
    #[error("Channel temporarily unavailable: {0}")]
    Unavailable(String),

    /// Inbound reply could not be understood
    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    /// Local I/O failed (console)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error
    #[error("Channel error: {0}")]
    Other(String),
}

impl ChannelError {
    /// Whether retrying later could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::HttpError(_) | Self::Unavailable(_) | Self::Io(_))
    }
}

impl From<WebhookFailure> for ChannelError {
    fn from(err: WebhookFailure) -> Self {
        match err {
            WebhookFailure::InvalidConfig(msg) => Self::InvalidConfig(msg),
            WebhookFailure::Transport(e) => Self::HttpError(e),
            WebhookFailure::Status { status, body } => {
                Self::Unavailable(format!("HTTP {status}: {body}"))
            }
        }
    }
}

// ============================================================================
// Presentations
// ============================================================================

/// Opaque identifier of one presentation on a channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresentationHandle(String);

impl PresentationHandle {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random handle
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PresentationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A draft shown to the operator together with its decision controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    pub topic: String,
    pub draft: Draft,
    pub attachment: Option<Attachment>,
    pub controls: Vec<Decision>,
    /// 1-based presentation round within the approval session
    pub round: u32,
}

// ============================================================================
// Replies
// ============================================================================

/// Kind of reply a correlation window expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    /// A press on one of the decision controls
    Decision,
    /// Free-text replacement content
    Text,
    /// Index into the offered attachment list
    AttachmentChoice,
}

impl ReplyKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Text => "text",
            Self::AttachmentChoice => "attachment_choice",
        }
    }
}

/// Reply from the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorReply {
    Decision(Decision),
    Text(String),
    /// 0-based index into the offered attachments
    AttachmentChoice(usize),
}

impl OperatorReply {
    /// Kind of this reply
    pub fn kind(&self) -> ReplyKind {
        match self {
            Self::Decision(_) => ReplyKind::Decision,
            Self::Text(_) => ReplyKind::Text,
            Self::AttachmentChoice(_) => ReplyKind::AttachmentChoice,
        }
    }
}

/// Inbound reply addressed to a presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub handle: PresentationHandle,
    pub reply: OperatorReply,
}

impl ChannelEvent {
    /// Create an event
    pub fn new(handle: PresentationHandle, reply: OperatorReply) -> Self {
        Self { handle, reply }
    }
}

/// Wire form of an inbound reply
///
/// Exactly one of `decision`, `text` and `attachment_choice` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundReply {
    pub handle: PresentationHandle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_choice: Option<usize>,
}

impl TryFrom<InboundReply> for ChannelEvent {
    type Error = ChannelError;

    fn try_from(inbound: InboundReply) -> ChannelResult<Self> {
        let reply = match (inbound.decision, inbound.text, inbound.attachment_choice) {
            (Some(Decision::Timeout), None, None) => {
                return Err(ChannelError::InvalidReply(
                    "timeout is not an operator decision".to_string(),
                ))
            }
            (Some(decision), None, None) => OperatorReply::Decision(decision),
            (None, Some(text), None) => OperatorReply::Text(text),
            (None, None, Some(choice)) => OperatorReply::AttachmentChoice(choice),
            _ => {
                return Err(ChannelError::InvalidReply(
                    "exactly one of decision, text or attachment_choice is required".to_string(),
                ))
            }
        };

        Ok(ChannelEvent::new(inbound.handle, reply))
    }
}

// ============================================================================
// Channel Trait
// ============================================================================

/// Outbound side of an operator messaging channel
#[async_trait]
pub trait OperatorChannel: Send + Sync {
    /// Get the channel name
    fn name(&self) -> &str;

    /// Show a draft with decision controls
    async fn present(&self, presentation: &Presentation) -> ChannelResult<PresentationHandle>;

    /// Disable the controls of an earlier presentation
    async fn invalidate_controls(&self, handle: &PresentationHandle) -> ChannelResult<()>;

    /// Ask for free-text replacement content
    async fn request_text(&self, handle: &PresentationHandle, prompt: &str) -> ChannelResult<()>;

    /// Offer a list of attachments to choose from
    async fn present_attachments(
        &self,
        handle: &PresentationHandle,
        choices: &[Attachment],
    ) -> ChannelResult<()>;

    /// Send an informational message
    async fn notify(&self, message: &str) -> ChannelResult<()>;

    /// Check if the channel is available
    async fn health_check(&self) -> ChannelResult<bool> {
        Ok(true)
    }

    /// Get channel configuration as JSON
    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
        })
    }
}
