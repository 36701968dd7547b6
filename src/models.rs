// Core data structures for the publishing pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Content draft produced by the generator
///
/// The pipeline treats the body as opaque text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Draft {
    #[serde(default)]
    pub title: String,
    pub body: String,
}

impl Draft {
    /// Create a draft with a title and body
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// Body length in characters
    pub fn char_count(&self) -> usize {
        self.body.chars().count()
    }

    /// Whether the body has no visible text
    pub fn is_blank(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// Kind of media attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
}

impl AttachmentKind {
    /// Guess the kind from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" => Some(Self::Image),
            "mp4" | "mov" | "webm" => Some(Self::Video),
            _ => None,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// Reference to a media attachment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attachment {
    /// Display name
    pub name: String,
    /// Path or URL the publish target can resolve
    pub location: String,
    pub kind: AttachmentKind,
}

impl Attachment {
    /// Create an attachment reference
    pub fn new(name: impl Into<String>, location: impl Into<String>, kind: AttachmentKind) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            kind,
        }
    }
}

impl std::fmt::Display for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.kind.as_str())
    }
}

// ============================================================================
// Decisions
// ============================================================================

/// Operator decision on a presented draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Cancel,
    Timeout,
    Edit,
    Regenerate,
    SwapAttachment,
    OmitAttachment,
}

impl Decision {
    /// Every decision, terminal ones first
    pub const ALL: [Decision; 7] = [
        Self::Approve,
        Self::Cancel,
        Self::Timeout,
        Self::Edit,
        Self::Regenerate,
        Self::SwapAttachment,
        Self::OmitAttachment,
    ];

    /// Terminal decisions end an approval session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approve | Self::Cancel | Self::Timeout)
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Cancel => "cancel",
            Self::Timeout => "timeout",
            Self::Edit => "edit",
            Self::Regenerate => "regenerate",
            Self::SwapAttachment => "swap_attachment",
            Self::OmitAttachment => "omit_attachment",
        }
    }

    /// Control label shown to the operator
    pub fn label(&self) -> &'static str {
        match self {
            Self::Approve => "✅ Publish",
            Self::Cancel => "❌ Cancel",
            Self::Timeout => "⏰ Timeout",
            Self::Edit => "✏️ Edit",
            Self::Regenerate => "🔄 Regenerate",
            Self::SwapAttachment => "📷 Change media",
            Self::OmitAttachment => "🚫 No media",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "approve" | "publish" => Some(Self::Approve),
            "cancel" => Some(Self::Cancel),
            "timeout" => Some(Self::Timeout),
            "edit" => Some(Self::Edit),
            "regenerate" => Some(Self::Regenerate),
            "swap_attachment" | "change_media" => Some(Self::SwapAttachment),
            "omit_attachment" | "no_media" => Some(Self::OmitAttachment),
            _ => None,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Work Items
// ============================================================================

/// Lifecycle of a single work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    Success,
    Error,
    Cancelled,
}

/// Pipeline stage an item failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Schedule,
    Generation,
    Approval,
    Publish,
}

impl FailureStage {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Generation => "generation",
            Self::Approval => "approval",
            Self::Publish => "publish",
        }
    }
}

/// Final outcome of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Published by the target
    Published { id: String, link: String },
    /// Operator cancelled, or approval timed out
    Cancelled { decision: Decision },
    /// Failed in some stage
    Failed { stage: FailureStage, error: String },
}

impl ItemOutcome {
    /// Map to the coarse item status
    pub fn status(&self) -> ItemStatus {
        match self {
            Self::Published { .. } => ItemStatus::Success,
            Self::Cancelled { .. } => ItemStatus::Cancelled,
            Self::Failed { .. } => ItemStatus::Error,
        }
    }

    /// Label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Published { .. } => "published",
            Self::Cancelled { decision: Decision::Timeout } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Recorded result of one processed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    /// Batch position
    pub position: usize,
    pub topic: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
    pub finished_at: DateTime<Utc>,
}

/// One unit of content moving through the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub topic: String,
    /// Current draft, once generated
    pub draft: Option<Draft>,
    /// Current media attachment
    pub attachment: Option<Attachment>,
    pub status: ItemStatus,
}

impl WorkItem {
    /// Create a pending item for a topic
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            draft: None,
            attachment: None,
            status: ItemStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_terminal() {
        let terminal: Vec<_> = Decision::ALL.iter().filter(|d| d.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![&Decision::Approve, &Decision::Cancel, &Decision::Timeout]
        );
    }

    #[test]
    fn test_decision_from_str() {
        assert_eq!(Decision::from_str("approve"), Some(Decision::Approve));
        assert_eq!(Decision::from_str("change_media"), Some(Decision::SwapAttachment));
        assert_eq!(Decision::from_str(" NO_MEDIA "), Some(Decision::OmitAttachment));
        assert_eq!(Decision::from_str("maybe"), None);
    }

    #[test]
    fn test_decision_serde() {
        let json = serde_json::to_string(&Decision::SwapAttachment).unwrap();
        assert_eq!(json, "\"swap_attachment\"");
    }

    #[test]
    fn test_attachment_kind_from_path() {
        assert_eq!(
            AttachmentKind::from_path(Path::new("a/b/cover.PNG")),
            Some(AttachmentKind::Image)
        );
        assert_eq!(
            AttachmentKind::from_path(Path::new("clip.mp4")),
            Some(AttachmentKind::Video)
        );
        assert_eq!(AttachmentKind::from_path(Path::new("notes.txt")), None);
    }

    #[test]
    fn test_outcome_status_and_label() {
        let published = ItemOutcome::Published {
            id: "42".into(),
            link: "https://example.com/42".into(),
        };
        assert_eq!(published.status(), ItemStatus::Success);
        assert_eq!(published.label(), "published");

        let timeout = ItemOutcome::Cancelled {
            decision: Decision::Timeout,
        };
        assert_eq!(timeout.status(), ItemStatus::Cancelled);
        assert_eq!(timeout.label(), "timeout");
    }

    #[test]
    fn test_item_result_serializes_flat() {
        let result = ItemResult {
            position: 0,
            topic: "rust".into(),
            outcome: ItemOutcome::Failed {
                stage: FailureStage::Publish,
                error: "boom".into(),
            },
            finished_at: Utc::now(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["stage"], "publish");
    }

    #[test]
    fn test_draft_helpers() {
        let draft = Draft::new("t", "  ");
        assert!(draft.is_blank());
        assert_eq!(Draft::new("t", "한글").char_count(), 2);
    }
}
