//! Unified error handling for the autopost crate
//!
//! Every module keeps its own error enum; this module folds them into a
//! single `Error` for use across module boundaries.
//!
//! # Architecture
//!
//! - [`AutopostErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use autopost::error::{AutopostErrorTrait, Error};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retry later: {err}");
//!     } else {
//!         eprintln!("Fatal error ({}): {err}", err.category());
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::approval::{ApprovalError, CorrelationError};
pub use crate::channel::ChannelError;
pub use crate::config::ConfigError;
pub use crate::generator::GenerationError;
pub use crate::publisher::PublishError;
pub use crate::queue::QueueError;
pub use crate::schedule::ScheduleError;

/// Common trait for all autopost error types
pub trait AutopostErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration and validation errors
    Config,
    /// Operator channel and reply correlation errors
    Channel,
    /// Content generation errors
    Generation,
    /// Publish target errors
    Publish,
    /// Schedule calculation errors
    Schedule,
    /// Queue API rejections
    Queue,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Channel => "channel",
            Self::Generation => "generation",
            Self::Publish => "publish",
            Self::Schedule => "schedule",
            Self::Queue => "queue",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for the autopost crate
#[derive(Error, Debug)]
pub enum Error {
    /// Schedule calculation errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Reply correlation errors
    #[error("Correlation error: {0}")]
    Correlation(#[from] CorrelationError),

    /// Operator channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Approval session errors
    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),

    /// Content generation errors
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Publish target errors
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Queue API rejections
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Configuration loading errors
    #[error("Config error: {0}")]
    ConfigFile(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl AutopostErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Schedule(e) => e.is_recoverable(),
            Self::Correlation(_) => false,
            Self::Channel(e) => e.is_recoverable(),
            Self::Approval(ApprovalError::Channel(e)) => e.is_recoverable(),
            Self::Approval(ApprovalError::Correlation(_)) => false,
            Self::Generation(e) => e.is_recoverable(),
            Self::Publish(e) => e.is_recoverable(),
            Self::Queue(e) => e.is_recoverable(),
            Self::ConfigFile(_) | Self::Config(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Schedule(_) => ErrorCategory::Schedule,
            Self::Correlation(_) | Self::Channel(_) | Self::Approval(_) => ErrorCategory::Channel,
            Self::Generation(GenerationError::InvalidConfig(_))
            | Self::Publish(PublishError::InvalidConfig(_)) => ErrorCategory::Config,
            Self::Generation(_) => ErrorCategory::Generation,
            Self::Publish(_) => ErrorCategory::Publish,
            Self::Queue(QueueError::InvalidSchedule(_)) => ErrorCategory::Schedule,
            Self::Queue(_) => ErrorCategory::Queue,
            Self::ConfigFile(_) | Self::Config(_) => ErrorCategory::Config,
            Self::Io(_) | Self::Json(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
