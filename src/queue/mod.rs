//! Publish queue
//!
//! Drives a batch of topics one at a time through generation, optional
//! human approval and publishing, pacing them with the schedule calculator.
//!
//! ```text
//! Idle ──start──> Waiting ──timer──> Processing ──settled──> Waiting ... ──> Completed
//!                    │                    │
//!                    └──────cancel────────┴──────────────────────────────> Cancelled
//! ```
//!
//! Per-item failures never abort the batch: they are recorded as that item's
//! result and the queue moves on. Cancelling keeps every result collected so
//! far; a publish call already in flight finishes and is still recorded.

pub mod driver;
pub mod state;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::ItemResult;
use crate::schedule::{DelaySource, ScheduleError};

pub use driver::{PublishQueue, QueueDeps};
pub use state::{ItemSummary, QueuePhase, QueueStatus};

/// Reference maximum batch size
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;

// ============================================================================
// Errors
// ============================================================================

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Rejections at the queue API boundary
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueueError {
    /// A batch is already running
    #[error("A batch is already active (run {run_id})")]
    AlreadyActive { run_id: Uuid },

    /// The batch has no items
    #[error("Batch is empty")]
    EmptyBatch,

    /// The batch exceeds the maximum size
    #[error("Batch of {len} items exceeds the maximum of {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// The schedule is invalid for this batch
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleError),

    /// Approval was requested but no operator channel is configured
    #[error("Approval required but no approval gate is configured")]
    ApprovalUnavailable,

    /// Cancel was called with no active batch
    #[error("No active batch")]
    NotActive,
}

impl QueueError {
    /// Whether the same call could succeed later without changes
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AlreadyActive { .. } | Self::NotActive)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Queue policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of items per batch
    pub max_batch_size: usize,
    /// Publish live (`true`) or as drafts (`false`)
    pub make_live: bool,
    /// Pick a default attachment for drafts generated without one
    pub auto_attach: bool,
    /// Overrides the approval gate's decision timeout
    pub approval_timeout_secs: Option<u64>,
    /// Capacity of the progress event channel
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            make_live: false,
            auto_attach: true,
            approval_timeout_secs: None,
            event_capacity: 100,
        }
    }
}

impl QueueConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be greater than 0".to_string());
        }
        if self.approval_timeout_secs == Some(0) {
            return Err("approval_timeout_secs must be greater than 0".to_string());
        }
        if self.event_capacity == 0 {
            return Err("event_capacity must be greater than 0".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Acknowledgements and Events
// ============================================================================

/// Accepted start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartAck {
    pub accepted: bool,
    pub run_id: Uuid,
    pub total: usize,
}

/// Accepted cancel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck {
    pub processed: usize,
    pub results: Vec<ItemResult>,
}

/// Progress events emitted by the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A timer is armed for the item at `cursor`
    Waiting {
        run_id: Uuid,
        cursor: usize,
        total: usize,
        item: String,
        publish_at: DateTime<Utc>,
        delay_ms: u64,
        source: DelaySource,
    },

    /// The item at `cursor` started processing
    Processing {
        run_id: Uuid,
        cursor: usize,
        total: usize,
        item: String,
    },

    /// The item at `cursor` has a recorded result
    ItemSettled {
        run_id: Uuid,
        cursor: usize,
        total: usize,
        item: String,
        result: ItemResult,
    },

    /// Every item was processed
    Completed {
        run_id: Uuid,
        processed: usize,
        total: usize,
        results: Vec<ItemResult>,
    },

    /// The batch was cancelled
    Cancelled {
        run_id: Uuid,
        processed: usize,
        total: usize,
        results: Vec<ItemResult>,
    },
}

impl QueueEvent {
    /// Run the event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::Waiting { run_id, .. }
            | Self::Processing { run_id, .. }
            | Self::ItemSettled { run_id, .. }
            | Self::Completed { run_id, .. }
            | Self::Cancelled { run_id, .. } => *run_id,
        }
    }

    /// Whether this event ends the run
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Cancelled { .. })
    }

    /// Get string representation of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Waiting { .. } => "waiting",
            Self::Processing { .. } => "processing",
            Self::ItemSettled { .. } => "item_settled",
            Self::Completed { .. } => "completed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}
