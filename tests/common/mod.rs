//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use autopost::approval::{ApprovalConfig, ApprovalGate, CorrelationKey, ReplyInbox};
use autopost::channel::{
    ChannelError, ChannelEvent, ChannelResult, OperatorChannel, OperatorReply, Presentation,
    PresentationHandle, ReplyKind,
};
use autopost::clock::ManualClock;
use autopost::generator::{ContentGenerator, GeneratedContent, GenerationError, GenerationResult};
use autopost::models::{Attachment, Decision, Draft};
use autopost::publisher::{PublishError, PublishReceipt, PublishRequest, PublishResult, PublishTarget};
use autopost::queue::{PublishQueue, QueueConfig, QueueDeps, QueueEvent};

/// Fixed "now" for queue tests
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap()
}

// ============================================================================
// Fakes
// ============================================================================

/// Operator channel that records everything it is asked to show
#[derive(Default)]
pub struct ScriptedChannel {
    next_handle: AtomicUsize,
    pub presented: Mutex<Vec<(PresentationHandle, Presentation)>>,
    pub invalidated: Mutex<Vec<PresentationHandle>>,
    pub notices: Mutex<Vec<String>>,
    pub offline: bool,
}

impl ScriptedChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn offline() -> Arc<Self> {
        Arc::new(Self {
            offline: true,
            ..Default::default()
        })
    }

    pub fn presentation_count(&self) -> usize {
        self.presented.lock().len()
    }

    pub fn last_presentation(&self) -> Option<Presentation> {
        self.presented.lock().last().map(|(_, p)| p.clone())
    }
}

#[async_trait]
impl OperatorChannel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn present(&self, presentation: &Presentation) -> ChannelResult<PresentationHandle> {
        if self.offline {
            return Err(ChannelError::Unavailable("offline".into()));
        }
        let n = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = PresentationHandle::new(format!("p-{n}"));
        self.presented.lock().push((handle.clone(), presentation.clone()));
        Ok(handle)
    }

    async fn invalidate_controls(&self, handle: &PresentationHandle) -> ChannelResult<()> {
        self.invalidated.lock().push(handle.clone());
        Ok(())
    }

    async fn request_text(&self, _handle: &PresentationHandle, _prompt: &str) -> ChannelResult<()> {
        Ok(())
    }

    async fn present_attachments(
        &self,
        _handle: &PresentationHandle,
        _choices: &[Attachment],
    ) -> ChannelResult<()> {
        Ok(())
    }

    async fn notify(&self, message: &str) -> ChannelResult<()> {
        self.notices.lock().push(message.to_string());
        Ok(())
    }
}

/// Generator producing numbered drafts; topics starting with "fail" error
#[derive(Default)]
pub struct ScriptedGenerator {
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, topic: &str) -> GenerationResult<GeneratedContent> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if topic.starts_with("fail") {
            return Err(GenerationError::Rejected(format!("cannot write about {topic}")));
        }
        Ok(GeneratedContent::new(Draft::new(
            topic,
            format!("draft {n} about {topic}"),
        )))
    }
}

/// Publish target that records requests
#[derive(Default)]
pub struct RecordingPublisher {
    pub requests: Mutex<Vec<PublishRequest>>,
    pub reject: bool,
    /// Time each publish call takes
    pub latency: Option<Duration>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject: true,
            ..Default::default()
        })
    }

    pub fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency: Some(latency),
            ..Default::default()
        })
    }

    pub fn bodies(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.body.clone()).collect()
    }
}

#[async_trait]
impl PublishTarget for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, request: &PublishRequest) -> PublishResult<PublishReceipt> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.reject {
            return Err(PublishError::Rejected {
                status: 422,
                body: "rejected".into(),
            });
        }
        let mut requests = self.requests.lock();
        requests.push(request.clone());
        let id = requests.len();
        Ok(PublishReceipt {
            id: id.to_string(),
            link: format!("https://blog.test/posts/{id}"),
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Queue wired to fakes
pub struct Harness {
    pub queue: PublishQueue,
    pub inbox: ReplyInbox,
    pub channel: Arc<ScriptedChannel>,
    pub generator: Arc<ScriptedGenerator>,
    pub publisher: Arc<RecordingPublisher>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(ScriptedChannel::new(), RecordingPublisher::new(), QueueConfig::default())
    }

    pub fn with(
        channel: Arc<ScriptedChannel>,
        publisher: Arc<RecordingPublisher>,
        config: QueueConfig,
    ) -> Self {
        let inbox = ReplyInbox::new();
        let generator = ScriptedGenerator::new();
        let clock = Arc::new(ManualClock::new(fixed_now()));
        let gate = ApprovalGate::new(channel.clone(), inbox.clone(), ApprovalConfig::default());

        let queue = PublishQueue::new(
            QueueDeps {
                generator: generator.clone(),
                publisher: publisher.clone(),
                gate: Some(Arc::new(gate)),
                attachments: None,
                clock: clock.clone(),
            },
            config,
        );

        Self {
            queue,
            inbox,
            channel,
            generator,
            publisher,
            clock,
        }
    }
}

// ============================================================================
// Operator and Event Helpers
// ============================================================================

/// Wait until the inbox expects a reply of `kind` on a handle other than `after`
pub async fn next_pending(
    inbox: &ReplyInbox,
    kind: ReplyKind,
    after: Option<&PresentationHandle>,
) -> CorrelationKey {
    loop {
        if let Some(key) = inbox.pending() {
            if key.kind == kind && Some(&key.handle) != after {
                return key;
            }
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Answer the pending decision question
pub async fn press(inbox: &ReplyInbox, decision: Decision, after: Option<&PresentationHandle>) -> PresentationHandle {
    let key = next_pending(inbox, ReplyKind::Decision, after).await;
    assert!(inbox.deliver(ChannelEvent::new(key.handle.clone(), OperatorReply::Decision(decision))));
    key.handle
}

/// Receive events until one matches
pub async fn next_event<F>(rx: &mut broadcast::Receiver<QueueEvent>, mut matches: F) -> QueueEvent
where
    F: FnMut(&QueueEvent) -> bool,
{
    loop {
        let event = rx.recv().await.expect("event channel closed");
        if matches(&event) {
            return event;
        }
    }
}

/// Receive events until the run ends
pub async fn final_event(rx: &mut broadcast::Receiver<QueueEvent>) -> QueueEvent {
    next_event(rx, QueueEvent::is_final).await
}

pub fn topics(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
