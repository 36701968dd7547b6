//! Queue state and status snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{ItemResult, ItemStatus, WorkItem};
use crate::schedule::{ScheduleConfig, ScheduleMode};

/// Lifecycle phase of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePhase {
    /// No batch has been started
    #[default]
    Idle,
    /// A timer is armed for the item at the cursor
    Waiting,
    /// The item at the cursor is being generated, approved or published
    Processing,
    /// Every item has been processed
    Completed,
    /// The batch was cancelled
    Cancelled,
}

impl QueuePhase {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for QueuePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable state of one queue, owned by the drive loop
#[derive(Debug, Default)]
pub(crate) struct QueueState {
    pub run_id: Option<Uuid>,
    pub items: Vec<WorkItem>,
    pub cursor: usize,
    pub schedule: ScheduleConfig,
    pub approval_required: bool,
    pub results: Vec<ItemResult>,
    pub active: bool,
    pub phase: QueuePhase,
    pub next_publish_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    /// Cancels the armed timer of the current run
    pub cancel: Option<CancellationToken>,
}

impl QueueState {
    /// Fresh state for an accepted batch
    pub fn started(
        run_id: Uuid,
        topics: Vec<String>,
        schedule: ScheduleConfig,
        approval_required: bool,
        cancel: CancellationToken,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: Some(run_id),
            items: topics.into_iter().map(WorkItem::new).collect(),
            cursor: 0,
            schedule,
            approval_required,
            results: Vec::new(),
            active: true,
            phase: QueuePhase::Waiting,
            next_publish_at: None,
            started_at: Some(now),
            cancel: Some(cancel),
        }
    }

    /// Whether this state still belongs to `run_id` and is running
    pub fn is_live(&self, run_id: Uuid) -> bool {
        self.active && self.run_id == Some(run_id)
    }

    /// Stop the run, disarming any timer
    pub fn deactivate(&mut self, phase: QueuePhase) {
        self.active = false;
        self.phase = phase;
        self.next_publish_at = None;
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn snapshot(&self) -> QueueStatus {
        QueueStatus {
            active: self.active,
            phase: self.phase,
            run_id: self.run_id,
            cursor: self.cursor,
            processed: self.results.len(),
            total: self.items.len(),
            mode: self.schedule.mode,
            approval_required: self.approval_required,
            next_publish_at: self.next_publish_at,
            started_at: self.started_at,
            items: self
                .items
                .iter()
                .map(|item| ItemSummary {
                    topic: item.topic.clone(),
                    status: item.status,
                })
                .collect(),
            results: self.results.clone(),
        }
    }
}

/// Topic and status of one batch item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub topic: String,
    pub status: ItemStatus,
}

/// Read-only snapshot of a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub active: bool,
    pub phase: QueuePhase,
    pub run_id: Option<Uuid>,
    /// Index of the next item to process
    pub cursor: usize,
    /// Number of recorded results
    pub processed: usize,
    pub total: usize,
    pub mode: ScheduleMode,
    pub approval_required: bool,
    /// Projected instant of the armed timer
    pub next_publish_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub items: Vec<ItemSummary>,
    pub results: Vec<ItemResult>,
}

impl QueueStatus {
    /// Format as display string
    pub fn display(&self) -> String {
        let mut output = String::from("Queue Status\n");
        output.push_str(&format!("{:-<40}\n", ""));
        output.push_str(&format!("Phase: {}\n", self.phase));
        output.push_str(&format!("Mode: {}\n", self.mode));
        output.push_str(&format!("Progress: {}/{}\n", self.processed, self.total));

        if let Some(at) = self.next_publish_at {
            output.push_str(&format!("Next Publish: {}\n", at.to_rfc3339()));
        }

        for result in &self.results {
            output.push_str(&format!(
                "  #{} {} -> {}\n",
                result.position + 1,
                result.topic,
                result.outcome.label()
            ));
        }

        output
    }
}
