//! Human approval
//!
//! The [`ApprovalGate`] presents a draft on an operator channel and loops
//! until the operator approves or cancels, or the wait times out. Replies are
//! matched to the pending question by [`CorrelationKey`], so a reply for a
//! superseded presentation, or of a kind that is not currently expected, is
//! dropped without effect.

pub mod gate;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use crate::channel::{ChannelEvent, OperatorReply, PresentationHandle, ReplyKind};

pub use gate::{
    ApprovalConfig, ApprovalError, ApprovalGate, ApprovalOutcome, ApprovalRequest,
    ApprovalSession, MAX_SESSION_HISTORY,
};
pub use registry::{CorrelationError, CorrelationRegistry, WaitOutcome};

/// Identifies the one reply the gate is waiting for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub handle: PresentationHandle,
    pub kind: ReplyKind,
}

impl CorrelationKey {
    /// Create a key
    pub fn new(handle: PresentationHandle, kind: ReplyKind) -> Self {
        Self { handle, kind }
    }
}

/// Inbound side of an operator channel
///
/// Channels and the control server push replies here; the approval gate
/// waits on it. Cloning shares the same registry.
#[derive(Clone, Default)]
pub struct ReplyInbox {
    registry: Arc<CorrelationRegistry<CorrelationKey, OperatorReply>>,
}

impl ReplyInbox {
    /// Create an empty inbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a reply; returns `true` if it answered the pending question
    pub fn deliver(&self, event: ChannelEvent) -> bool {
        let key = CorrelationKey::new(event.handle, event.reply.kind());
        let accepted = self.registry.resolve(&key, event.reply);
        if !accepted {
            tracing::debug!(
                handle = %key.handle,
                kind = key.kind.as_str(),
                "Dropped stale or unexpected operator reply"
            );
        }
        accepted
    }

    /// The question currently awaiting a reply, if any
    pub fn pending(&self) -> Option<CorrelationKey> {
        self.registry.current_key()
    }

    pub(crate) async fn wait(
        &self,
        key: CorrelationKey,
        timeout: Duration,
    ) -> Result<WaitOutcome<OperatorReply>, CorrelationError> {
        self.registry.wait_for(key, timeout).await
    }
}
