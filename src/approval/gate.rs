//! Approval gate
//!
//! Presents one draft to the operator and loops until a terminal decision.
//!
//! ```text
//!            ┌──────────────── edit / regenerate / swap / omit ─────┐
//!            v                                                      │
//!   present ──> wait (approval timeout) ──> invalidate controls ──> apply
//!                                                │
//!                                                └─> approve | cancel | timeout ──> done
//! ```
//!
//! Every presentation gets a fresh handle. Replies are keyed by handle and
//! reply kind, so a press on a superseded presentation never reaches the
//! current round. A request may carry a cancellation token; when it fires,
//! the open window closes, the controls are invalidated and the session ends
//! with [`Decision::Cancel`].

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{CorrelationError, CorrelationKey, ReplyInbox, WaitOutcome};
use crate::attachments::AttachmentSource;
use crate::channel::{
    ChannelError, OperatorChannel, OperatorReply, Presentation, PresentationHandle, ReplyKind,
};
use crate::generator::ContentGenerator;
use crate::metrics;
use crate::models::{Attachment, Decision, Draft};

/// Non-terminal decisions kept per session for diagnostics
pub const MAX_SESSION_HISTORY: usize = 32;

/// Default wait for a decision (2 hours)
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 2 * 60 * 60;

/// Default wait for edit text or an attachment choice (2 hours)
pub const DEFAULT_REPLY_TIMEOUT_SECS: u64 = 2 * 60 * 60;

// ============================================================================
// Configuration
// ============================================================================

/// Approval timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Seconds to wait for a decision on a presentation
    pub approval_timeout_secs: u64,
    /// Seconds to wait for edit text or an attachment choice
    pub reply_timeout_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            approval_timeout_secs: DEFAULT_APPROVAL_TIMEOUT_SECS,
            reply_timeout_secs: DEFAULT_REPLY_TIMEOUT_SECS,
        }
    }
}

impl ApprovalConfig {
    /// Decision timeout
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    /// Edit / attachment-choice timeout
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.approval_timeout_secs == 0 {
            return Err("approval_timeout_secs must be greater than 0".to_string());
        }
        if self.reply_timeout_secs == 0 {
            return Err("reply_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Request / Outcome
// ============================================================================

/// Errors that end an approval session without a decision
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// The channel could not deliver a presentation or prompt
    #[error("Operator channel failed: {0}")]
    Channel(#[from] ChannelError),

    /// Another approval is already waiting on this inbox
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

/// One item to approve
pub struct ApprovalRequest<'a> {
    pub topic: &'a str,
    pub draft: Draft,
    pub attachment: Option<Attachment>,
    /// Overrides the configured decision timeout
    pub timeout: Option<Duration>,
    /// Called on "regenerate"
    pub regenerator: &'a dyn ContentGenerator,
    /// Ends the session early when cancelled
    pub cancel: Option<CancellationToken>,
}

/// Result of an approval session
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalOutcome {
    /// Terminal decision
    pub decision: Decision,
    /// Draft as last presented
    pub draft: Draft,
    /// Attachment as last presented
    pub attachment: Option<Attachment>,
    /// Number of presentations made
    pub rounds: u32,
    /// Non-terminal decisions applied, oldest first
    pub history: Vec<Decision>,
}

impl ApprovalOutcome {
    /// Whether the draft should be published
    pub fn is_approved(&self) -> bool {
        self.decision == Decision::Approve
    }
}

/// State of one approval session
#[derive(Debug, Clone)]
pub struct ApprovalSession {
    pub draft: Draft,
    pub attachment: Option<Attachment>,
    /// Handle of the presentation currently awaiting a reply
    pub handle: Option<PresentationHandle>,
    pub round: u32,
    history: VecDeque<Decision>,
}

impl ApprovalSession {
    fn new(draft: Draft, attachment: Option<Attachment>) -> Self {
        Self {
            draft,
            attachment,
            handle: None,
            round: 0,
            history: VecDeque::new(),
        }
    }

    fn record(&mut self, decision: Decision) {
        if self.history.len() == MAX_SESSION_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(decision);
    }

    /// Non-terminal decisions applied so far
    pub fn history(&self) -> impl Iterator<Item = &Decision> {
        self.history.iter()
    }

    fn finish(self, decision: Decision) -> ApprovalOutcome {
        ApprovalOutcome {
            decision,
            draft: self.draft,
            attachment: self.attachment,
            rounds: self.round,
            history: self.history.into_iter().collect(),
        }
    }
}

/// A reply wait that may be cut short by cancellation
enum Waited {
    Reply(WaitOutcome<OperatorReply>),
    Aborted,
}

/// Whether a sub-flow finished or the session was cancelled under it
enum Flow {
    Continue,
    Aborted,
}

// ============================================================================
// Gate
// ============================================================================

/// Human approval checkpoint on one operator channel
pub struct ApprovalGate {
    channel: Arc<dyn OperatorChannel>,
    inbox: ReplyInbox,
    attachments: Option<Arc<dyn AttachmentSource>>,
    config: ApprovalConfig,
}

impl ApprovalGate {
    /// Create a gate; replies must be delivered into `inbox`
    pub fn new(channel: Arc<dyn OperatorChannel>, inbox: ReplyInbox, config: ApprovalConfig) -> Self {
        Self {
            channel,
            inbox,
            attachments: None,
            config,
        }
    }

    /// Offer attachment swaps from `source`
    pub fn with_attachments(mut self, source: Arc<dyn AttachmentSource>) -> Self {
        self.attachments = Some(source);
        self
    }

    /// Inbox replies are correlated through
    pub fn inbox(&self) -> &ReplyInbox {
        &self.inbox
    }

    /// Gate configuration
    pub fn config(&self) -> &ApprovalConfig {
        &self.config
    }

    /// Send an informational message; failures are logged and ignored
    pub async fn notify(&self, message: &str) {
        if let Err(e) = self.channel.notify(message).await {
            tracing::warn!(channel = self.channel.name(), error = %e, "Failed to notify operator");
        }
    }

    fn controls(&self, session: &ApprovalSession) -> Vec<Decision> {
        let mut controls = vec![Decision::Approve, Decision::Edit, Decision::Regenerate];
        if self.attachments.is_some() {
            controls.push(Decision::SwapAttachment);
        }
        if session.attachment.is_some() {
            controls.push(Decision::OmitAttachment);
        }
        controls.push(Decision::Cancel);
        controls
    }

    async fn wait(
        &self,
        key: CorrelationKey,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Waited, ApprovalError> {
        let Some(cancel) = cancel else {
            return Ok(Waited::Reply(self.inbox.wait(key, timeout).await?));
        };

        // Dropping the losing wait closes its correlation window
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Waited::Aborted),
            waited = self.inbox.wait(key, timeout) => Ok(Waited::Reply(waited?)),
        }
    }

    async fn invalidate(&self, handle: &PresentationHandle) {
        if let Err(e) = self.channel.invalidate_controls(handle).await {
            tracing::warn!(handle = %handle, error = %e, "Failed to invalidate controls");
        }
    }

    /// Present a draft and loop until approve, cancel or timeout
    ///
    /// Channel failures while presenting or prompting end the session with
    /// an error; nothing is retried here.
    pub async fn request_approval(
        &self,
        request: ApprovalRequest<'_>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let timeout = request.timeout.unwrap_or_else(|| self.config.approval_timeout());
        let topic = request.topic;
        let cancel = request.cancel.as_ref();
        let mut session = ApprovalSession::new(request.draft, request.attachment);

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Ok(self.abort(session, topic).await);
            }

            session.round += 1;
            let presentation = Presentation {
                topic: topic.to_string(),
                draft: session.draft.clone(),
                attachment: session.attachment.clone(),
                controls: self.controls(&session),
                round: session.round,
            };

            let handle = self.channel.present(&presentation).await?;
            session.handle = Some(handle.clone());
            tracing::info!(
                topic = %topic,
                round = session.round,
                handle = %handle,
                "Draft presented for approval"
            );

            let waited = self
                .wait(
                    CorrelationKey::new(handle.clone(), ReplyKind::Decision),
                    timeout,
                    cancel,
                )
                .await;
            self.invalidate(&handle).await;

            let decision = match waited? {
                Waited::Reply(WaitOutcome::Matched(OperatorReply::Decision(decision))) => decision,
                Waited::Reply(WaitOutcome::Matched(other)) => {
                    tracing::warn!(reply = ?other, "Unexpected reply kind for decision window");
                    continue;
                }
                Waited::Reply(WaitOutcome::TimedOut) => Decision::Timeout,
                Waited::Aborted => return Ok(self.abort(session, topic).await),
            };

            metrics::record_decision(decision.as_str());
            tracing::info!(topic = %topic, round = session.round, decision = %decision, "Operator decision");

            match decision {
                Decision::Approve => return Ok(session.finish(decision)),
                Decision::Cancel => {
                    self.notify("❌ Publishing cancelled").await;
                    return Ok(session.finish(decision));
                }
                Decision::Timeout => {
                    self.notify(&format!(
                        "⏰ No response within {}, skipped",
                        crate::utils::format_duration(timeout)
                    ))
                    .await;
                    return Ok(session.finish(decision));
                }
                Decision::Edit => {
                    if let Flow::Aborted = self.apply_edit(&mut session, &handle, cancel).await? {
                        return Ok(self.abort(session, topic).await);
                    }
                }
                Decision::Regenerate => {
                    self.apply_regenerate(&mut session, topic, request.regenerator)
                        .await
                }
                Decision::SwapAttachment => {
                    if let Flow::Aborted = self.apply_swap(&mut session, &handle, cancel).await? {
                        return Ok(self.abort(session, topic).await);
                    }
                }
                Decision::OmitAttachment => {
                    session.attachment = None;
                    self.notify("🚫 Media removed, publishing text only").await;
                }
            }

            session.record(decision);
        }
    }

    async fn abort(&self, session: ApprovalSession, topic: &str) -> ApprovalOutcome {
        tracing::info!(topic = %topic, round = session.round, "Approval aborted by cancellation");
        self.notify("⏹️ Batch cancelled, draft discarded").await;
        session.finish(Decision::Cancel)
    }

    async fn apply_edit(
        &self,
        session: &mut ApprovalSession,
        handle: &PresentationHandle,
        cancel: Option<&CancellationToken>,
    ) -> Result<Flow, ApprovalError> {
        self.channel
            .request_text(handle, "Send the replacement text")
            .await?;

        let waited = self
            .wait(
                CorrelationKey::new(handle.clone(), ReplyKind::Text),
                self.config.reply_timeout(),
                cancel,
            )
            .await?;

        match waited {
            Waited::Aborted => return Ok(Flow::Aborted),
            Waited::Reply(WaitOutcome::Matched(OperatorReply::Text(text))) if !text.trim().is_empty() => {
                let chars = text.chars().count();
                session.draft.body = text;
                tracing::info!(chars, "Draft edited by operator");
                self.notify(&format!("✏️ Edit applied ({chars} chars)")).await;
            }
            Waited::Reply(WaitOutcome::Matched(_)) => {
                tracing::info!("Blank edit received, keeping draft");
                self.notify("⚠️ Edit was empty, keeping the current draft")
                    .await;
            }
            Waited::Reply(WaitOutcome::TimedOut) => {
                tracing::info!("Edit not received in time, keeping draft");
                self.notify("⚠️ Edit timed out, keeping the current draft")
                    .await;
            }
        }
        Ok(Flow::Continue)
    }

    async fn apply_regenerate(
        &self,
        session: &mut ApprovalSession,
        topic: &str,
        regenerator: &dyn ContentGenerator,
    ) {
        self.notify("🔄 Regenerating draft...").await;

        let regenerated = match regenerator.generate(topic).await {
            Ok(content) => content.into_checked(topic),
            Err(e) => Err(e),
        };

        match regenerated {
            Ok((draft, attachment)) => {
                session.draft = draft;
                if attachment.is_some() {
                    session.attachment = attachment;
                }
                tracing::info!(topic = %topic, "Draft regenerated");
            }
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "Regeneration failed, keeping draft");
                self.notify(&format!(
                    "⚠️ Regeneration failed ({e}), keeping the current draft"
                ))
                .await;
            }
        }
    }

    async fn apply_swap(
        &self,
        session: &mut ApprovalSession,
        handle: &PresentationHandle,
        cancel: Option<&CancellationToken>,
    ) -> Result<Flow, ApprovalError> {
        let available = match &self.attachments {
            Some(source) => source.list().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to list attachments");
                Vec::new()
            }),
            None => Vec::new(),
        };

        if available.is_empty() {
            self.notify("⚠️ No media available").await;
            return Ok(Flow::Continue);
        }

        self.channel.present_attachments(handle, &available).await?;

        let waited = self
            .wait(
                CorrelationKey::new(handle.clone(), ReplyKind::AttachmentChoice),
                self.config.reply_timeout(),
                cancel,
            )
            .await;
        self.invalidate(handle).await;

        let waited = match waited? {
            Waited::Reply(waited) => waited,
            Waited::Aborted => return Ok(Flow::Aborted),
        };

        match waited {
            WaitOutcome::Matched(OperatorReply::AttachmentChoice(index)) if index < available.len() => {
                let chosen = available.into_iter().nth(index);
                if let Some(chosen) = chosen {
                    self.notify(&format!("📷 Media changed to {chosen}")).await;
                    session.attachment = Some(chosen);
                }
            }
            WaitOutcome::Matched(reply) => {
                tracing::info!(reply = ?reply, "Invalid attachment choice, keeping media");
                self.notify("⚠️ Invalid choice, keeping the current media").await;
            }
            WaitOutcome::TimedOut => {
                self.notify("⚠️ Media choice timed out, keeping the current media")
                    .await;
            }
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelEvent, ChannelResult};
    use crate::generator::{GeneratedContent, GenerationError, GenerationResult};
    use crate::models::AttachmentKind;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Channel that records calls; handles are named after the round
    struct TestChannel {
        presented: Mutex<Vec<Presentation>>,
        invalidated: Mutex<Vec<PresentationHandle>>,
        notices: Mutex<Vec<String>>,
        fail_present: bool,
    }

    impl TestChannel {
        fn new() -> Arc<Self> {
            Self::with_failure(false)
        }

        fn with_failure(fail_present: bool) -> Arc<Self> {
            Arc::new(Self {
                presented: Mutex::new(Vec::new()),
                invalidated: Mutex::new(Vec::new()),
                notices: Mutex::new(Vec::new()),
                fail_present,
            })
        }
    }

    #[async_trait]
    impl OperatorChannel for TestChannel {
        fn name(&self) -> &str {
            "test"
        }

        async fn present(&self, presentation: &Presentation) -> ChannelResult<PresentationHandle> {
            if self.fail_present {
                return Err(ChannelError::Unavailable("down".into()));
            }
            let handle = PresentationHandle::new(format!("round-{}", presentation.round));
            self.presented.lock().push(presentation.clone());
            Ok(handle)
        }

        async fn invalidate_controls(&self, handle: &PresentationHandle) -> ChannelResult<()> {
            self.invalidated.lock().push(handle.clone());
            Ok(())
        }

        async fn request_text(&self, _: &PresentationHandle, _: &str) -> ChannelResult<()> {
            Ok(())
        }

        async fn present_attachments(
            &self,
            _: &PresentationHandle,
            _: &[Attachment],
        ) -> ChannelResult<()> {
            Ok(())
        }

        async fn notify(&self, message: &str) -> ChannelResult<()> {
            self.notices.lock().push(message.to_string());
            Ok(())
        }
    }

    struct FixedGenerator(Option<&'static str>);

    #[async_trait]
    impl ContentGenerator for FixedGenerator {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _topic: &str) -> GenerationResult<GeneratedContent> {
            match self.0 {
                Some(body) => Ok(GeneratedContent::new(Draft::new("", body))),
                None => Err(GenerationError::Rejected("offline".into())),
            }
        }
    }

    struct TwoImages;

    #[async_trait]
    impl AttachmentSource for TwoImages {
        async fn list(&self) -> std::io::Result<Vec<Attachment>> {
            Ok(vec![
                Attachment::new("a.png", "/a.png", AttachmentKind::Image),
                Attachment::new("b.png", "/b.png", AttachmentKind::Image),
            ])
        }
    }

    fn request<'a>(generator: &'a dyn ContentGenerator) -> ApprovalRequest<'a> {
        ApprovalRequest {
            topic: "rust",
            draft: Draft::new("T", "original"),
            attachment: None,
            timeout: Some(Duration::from_secs(60)),
            regenerator: generator,
            cancel: None,
        }
    }

    /// Wait until the gate opens a window of `kind`
    async fn pending(inbox: &ReplyInbox, kind: ReplyKind) -> PresentationHandle {
        loop {
            if let Some(key) = inbox.pending() {
                if key.kind == kind {
                    return key.handle;
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Wait until the gate opens a window of `kind` on presentation `handle`
    async fn pending_on(inbox: &ReplyInbox, kind: ReplyKind, handle: &str) -> PresentationHandle {
        loop {
            let found = pending(inbox, kind).await;
            if found.as_str() == handle {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn reply(inbox: &ReplyInbox, handle: &PresentationHandle, reply: OperatorReply) -> bool {
        inbox.deliver(ChannelEvent::new(handle.clone(), reply))
    }

    #[tokio::test(start_paused = true)]
    async fn test_approve_first_round() {
        let channel = TestChannel::new();
        let inbox = ReplyInbox::new();
        let gate = Arc::new(ApprovalGate::new(channel.clone(), inbox.clone(), ApprovalConfig::default()));
        let generator = FixedGenerator(Some("new"));

        let driver = {
            let inbox = inbox.clone();
            tokio::spawn(async move {
                let handle = pending(&inbox, ReplyKind::Decision).await;
                reply(&inbox, &handle, OperatorReply::Decision(Decision::Approve));
            })
        };

        let outcome = gate.request_approval(request(&generator)).await.unwrap();
        driver.await.unwrap();

        assert!(outcome.is_approved());
        assert_eq!(outcome.draft.body, "original");
        assert_eq!(outcome.rounds, 1);
        assert_eq!(channel.invalidated.lock().len(), 1);
        assert_eq!(
            channel.presented.lock()[0].controls,
            vec![Decision::Approve, Decision::Edit, Decision::Regenerate, Decision::Cancel]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_then_approve() {
        let channel = TestChannel::new();
        let inbox = ReplyInbox::new();
        let gate = ApprovalGate::new(channel.clone(), inbox.clone(), ApprovalConfig::default());
        let generator = FixedGenerator(None);

        let driver = {
            let inbox = inbox.clone();
            tokio::spawn(async move {
                let h = pending(&inbox, ReplyKind::Decision).await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::Edit));
                let h = pending(&inbox, ReplyKind::Text).await;
                reply(&inbox, &h, OperatorReply::Text("X".into()));
                let h = pending_on(&inbox, ReplyKind::Decision, "round-2").await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::Approve));
            })
        };

        let outcome = gate.request_approval(request(&generator)).await.unwrap();
        driver.await.unwrap();

        assert_eq!(outcome.decision, Decision::Approve);
        assert_eq!(outcome.draft.body, "X");
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.history, vec![Decision::Edit]);
        assert_eq!(channel.presented.lock()[1].draft.body, "X");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_once() {
        let channel = TestChannel::new();
        let inbox = ReplyInbox::new();
        let gate = ApprovalGate::new(channel.clone(), inbox.clone(), ApprovalConfig::default());
        let generator = FixedGenerator(None);

        let outcome = gate.request_approval(request(&generator)).await.unwrap();

        assert_eq!(outcome.decision, Decision::Timeout);
        assert_eq!(outcome.rounds, 1);
        assert!(inbox.pending().is_none());
        // Late press on the timed-out presentation is inert
        assert!(!reply(
            &inbox,
            &PresentationHandle::new("round-1"),
            OperatorReply::Decision(Decision::Approve)
        ));
        assert!(channel.notices.lock().iter().any(|n| n.contains("No response")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_timeout_keeps_draft() {
        let channel = TestChannel::new();
        let inbox = ReplyInbox::new();
        let config = ApprovalConfig {
            approval_timeout_secs: 60,
            reply_timeout_secs: 5,
        };
        let gate = ApprovalGate::new(channel.clone(), inbox.clone(), config);
        let generator = FixedGenerator(None);

        let driver = {
            let inbox = inbox.clone();
            tokio::spawn(async move {
                let h = pending(&inbox, ReplyKind::Decision).await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::Edit));
                let h = pending(&inbox, ReplyKind::Decision).await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::Cancel));
            })
        };

        let outcome = gate.request_approval(request(&generator)).await.unwrap();
        driver.await.unwrap();

        assert_eq!(outcome.decision, Decision::Cancel);
        assert_eq!(outcome.draft.body, "original");
        assert!(channel.notices.lock().iter().any(|n| n.contains("Edit timed out")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_regenerate_failure_keeps_draft() {
        let channel = TestChannel::new();
        let inbox = ReplyInbox::new();
        let gate = ApprovalGate::new(channel.clone(), inbox.clone(), ApprovalConfig::default());
        let generator = FixedGenerator(None);

        let driver = {
            let inbox = inbox.clone();
            tokio::spawn(async move {
                let h = pending(&inbox, ReplyKind::Decision).await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::Regenerate));
                let h = pending_on(&inbox, ReplyKind::Decision, "round-2").await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::Approve));
            })
        };

        let outcome = gate.request_approval(request(&generator)).await.unwrap();
        driver.await.unwrap();

        assert_eq!(outcome.draft.body, "original");
        assert!(channel
            .notices
            .lock()
            .iter()
            .any(|n| n.contains("Regeneration failed")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_regenerate_replaces_draft() {
        let channel = TestChannel::new();
        let inbox = ReplyInbox::new();
        let gate = ApprovalGate::new(channel.clone(), inbox.clone(), ApprovalConfig::default());
        let generator = FixedGenerator(Some("fresh"));

        let driver = {
            let inbox = inbox.clone();
            tokio::spawn(async move {
                let h = pending(&inbox, ReplyKind::Decision).await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::Regenerate));
                let h = pending_on(&inbox, ReplyKind::Decision, "round-2").await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::Approve));
            })
        };

        let outcome = gate.request_approval(request(&generator)).await.unwrap();
        driver.await.unwrap();
        assert_eq!(outcome.draft.body, "fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_and_omit_attachment() {
        let channel = TestChannel::new();
        let inbox = ReplyInbox::new();
        let gate = ApprovalGate::new(channel.clone(), inbox.clone(), ApprovalConfig::default())
            .with_attachments(Arc::new(TwoImages));
        let generator = FixedGenerator(None);

        let driver = {
            let inbox = inbox.clone();
            tokio::spawn(async move {
                let h = pending(&inbox, ReplyKind::Decision).await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::SwapAttachment));
                let h = pending(&inbox, ReplyKind::AttachmentChoice).await;
                reply(&inbox, &h, OperatorReply::AttachmentChoice(1));
                let h = pending_on(&inbox, ReplyKind::Decision, "round-2").await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::Approve));
            })
        };

        let outcome = gate.request_approval(request(&generator)).await.unwrap();
        driver.await.unwrap();

        assert_eq!(outcome.attachment.as_ref().map(|a| a.name.as_str()), Some("b.png"));
        let presented = channel.presented.lock();
        assert!(presented[0].controls.contains(&Decision::SwapAttachment));
        assert!(!presented[0].controls.contains(&Decision::OmitAttachment));
        assert!(presented[1].controls.contains(&Decision::OmitAttachment));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_press_does_not_reach_later_round() {
        let channel = TestChannel::new();
        let inbox = ReplyInbox::new();
        let gate = ApprovalGate::new(channel.clone(), inbox.clone(), ApprovalConfig::default());
        let generator = FixedGenerator(None);

        let driver = {
            let inbox = inbox.clone();
            tokio::spawn(async move {
                let first = pending(&inbox, ReplyKind::Decision).await;
                reply(&inbox, &first, OperatorReply::Decision(Decision::Edit));
                let h = pending(&inbox, ReplyKind::Text).await;
                reply(&inbox, &h, OperatorReply::Text("edited".into()));
                pending_on(&inbox, ReplyKind::Decision, "round-2").await;
                // Duplicate press on round 1's controls
                assert!(!reply(&inbox, &first, OperatorReply::Decision(Decision::Cancel)));
                let h = pending(&inbox, ReplyKind::Decision).await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::Approve));
            })
        };

        let outcome = gate.request_approval(request(&generator)).await.unwrap();
        driver.await.unwrap();

        assert_eq!(outcome.decision, Decision::Approve);
        assert_eq!(outcome.draft.body, "edited");
    }

    #[tokio::test(start_paused = true)]
    async fn test_present_failure_propagates() {
        let channel = TestChannel::with_failure(true);
        let gate = ApprovalGate::new(channel, ReplyInbox::new(), ApprovalConfig::default());
        let generator = FixedGenerator(None);

        let result = gate.request_approval(request(&generator)).await;
        assert!(matches!(result, Err(ApprovalError::Channel(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_ends_decision_wait() {
        let channel = TestChannel::new();
        let inbox = ReplyInbox::new();
        let gate = ApprovalGate::new(channel.clone(), inbox.clone(), ApprovalConfig::default());
        let generator = FixedGenerator(None);
        let cancel = CancellationToken::new();

        let canceller = {
            let inbox = inbox.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                pending(&inbox, ReplyKind::Decision).await;
                cancel.cancel();
            })
        };

        let outcome = gate
            .request_approval(ApprovalRequest {
                cancel: Some(cancel),
                ..request(&generator)
            })
            .await
            .unwrap();
        canceller.await.unwrap();

        assert_eq!(outcome.decision, Decision::Cancel);
        assert_eq!(outcome.draft.body, "original");
        assert!(inbox.pending().is_none());
        assert_eq!(
            channel.invalidated.lock().as_slice(),
            &[PresentationHandle::new("round-1")]
        );
        // The window is gone, so a press on the old controls is inert
        assert!(!reply(
            &inbox,
            &PresentationHandle::new("round-1"),
            OperatorReply::Decision(Decision::Approve)
        ));
        assert!(channel.notices.lock().iter().any(|n| n.contains("Batch cancelled")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_ends_edit_wait() {
        let channel = TestChannel::new();
        let inbox = ReplyInbox::new();
        let gate = ApprovalGate::new(channel.clone(), inbox.clone(), ApprovalConfig::default());
        let generator = FixedGenerator(None);
        let cancel = CancellationToken::new();

        let driver = {
            let inbox = inbox.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let h = pending(&inbox, ReplyKind::Decision).await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::Edit));
                pending(&inbox, ReplyKind::Text).await;
                cancel.cancel();
            })
        };

        let outcome = gate
            .request_approval(ApprovalRequest {
                cancel: Some(cancel),
                ..request(&generator)
            })
            .await
            .unwrap();
        driver.await.unwrap();

        assert_eq!(outcome.decision, Decision::Cancel);
        assert_eq!(outcome.rounds, 1);
        assert!(inbox.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_edit_keeps_draft() {
        let channel = TestChannel::new();
        let inbox = ReplyInbox::new();
        let gate = ApprovalGate::new(channel.clone(), inbox.clone(), ApprovalConfig::default());
        let generator = FixedGenerator(None);

        let driver = {
            let inbox = inbox.clone();
            tokio::spawn(async move {
                let h = pending(&inbox, ReplyKind::Decision).await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::Edit));
                let h = pending(&inbox, ReplyKind::Text).await;
                reply(&inbox, &h, OperatorReply::Text("  \n ".into()));
                let h = pending_on(&inbox, ReplyKind::Decision, "round-2").await;
                reply(&inbox, &h, OperatorReply::Decision(Decision::Approve));
            })
        };

        let outcome = gate.request_approval(request(&generator)).await.unwrap();
        driver.await.unwrap();

        assert!(outcome.is_approved());
        assert_eq!(outcome.draft.body, "original");
        assert_eq!(channel.presented.lock()[1].draft.body, "original");
        assert!(channel.notices.lock().iter().any(|n| n.contains("Edit was empty")));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut session = ApprovalSession::new(Draft::default(), None);
        for _ in 0..MAX_SESSION_HISTORY + 5 {
            session.record(Decision::Edit);
        }
        session.record(Decision::Regenerate);
        assert_eq!(session.history().count(), MAX_SESSION_HISTORY);
        assert_eq!(session.history().last(), Some(&Decision::Regenerate));
    }

    #[test]
    fn test_config_validate() {
        assert!(ApprovalConfig::default().validate().is_ok());
        let zero = ApprovalConfig {
            approval_timeout_secs: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }
}
