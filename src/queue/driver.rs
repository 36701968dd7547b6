//! Queue drive loop
//!
//! One spawned task per accepted batch. Each iteration computes the delay
//! for the item at the cursor, waits for it (or for cancellation), processes
//! the item and records the result. State changes and event emission happen
//! together under the state lock so subscribers see them in order.
//!
//! Cancelling a run stops its timer and ends any approval it is waiting on;
//! a publish already in flight finishes and is recorded. A new batch is only
//! accepted once the cancelled run's task has settled, so two runs never
//! share the operator channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::state::{QueuePhase, QueueState, QueueStatus};
use super::{CancelAck, QueueConfig, QueueError, QueueEvent, QueueResult, StartAck};
use crate::approval::{ApprovalGate, ApprovalRequest};
use crate::attachments::AttachmentSource;
use crate::clock::Clock;
use crate::generator::ContentGenerator;
use crate::metrics;
use crate::models::{Attachment, Draft, FailureStage, ItemOutcome, ItemResult};
use crate::publisher::{PublishRequest, PublishTarget};
use crate::schedule::{self, ScheduleConfig};

/// Collaborators of a queue
pub struct QueueDeps {
    pub generator: Arc<dyn ContentGenerator>,
    pub publisher: Arc<dyn PublishTarget>,
    /// Required for batches started with approval
    pub gate: Option<Arc<ApprovalGate>>,
    /// Default attachments for new drafts
    pub attachments: Option<Arc<dyn AttachmentSource>>,
    pub clock: Arc<dyn Clock>,
}

struct Inner {
    deps: QueueDeps,
    config: QueueConfig,
    state: RwLock<QueueState>,
    events: broadcast::Sender<QueueEvent>,
    /// Drive task of the latest run
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Batch publishing queue
///
/// Cloning is cheap and shares the same queue.
#[derive(Clone)]
pub struct PublishQueue {
    inner: Arc<Inner>,
}

impl PublishQueue {
    /// Create an idle queue
    pub fn new(deps: QueueDeps, config: QueueConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                deps,
                config,
                state: RwLock::new(QueueState::default()),
                events,
                task: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Queue configuration
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Whether batches may request approval
    pub fn has_approval_gate(&self) -> bool {
        self.inner.deps.gate.is_some()
    }

    /// Start a batch
    ///
    /// Rejected without any state change if a batch is active, the batch is
    /// empty or too large, the schedule is invalid for it, or approval is
    /// requested without a gate. After a cancel, waits for the cancelled
    /// run's in-flight item to settle first.
    pub async fn start(
        &self,
        topics: Vec<String>,
        schedule: ScheduleConfig,
        approval_required: bool,
    ) -> QueueResult<StartAck> {
        let mut task = self.inner.task.lock().await;
        self.settle_previous(&mut task).await;

        let mut state = self.inner.state.write().await;

        let rejection = if let (true, Some(run_id)) = (state.active, state.run_id) {
            Some(QueueError::AlreadyActive { run_id })
        } else if topics.is_empty() {
            Some(QueueError::EmptyBatch)
        } else if topics.len() > self.inner.config.max_batch_size {
            Some(QueueError::BatchTooLarge {
                len: topics.len(),
                max: self.inner.config.max_batch_size,
            })
        } else if approval_required && self.inner.deps.gate.is_none() {
            Some(QueueError::ApprovalUnavailable)
        } else {
            schedule.validate_for_batch(topics.len()).err().map(QueueError::from)
        };

        if let Some(err) = rejection {
            tracing::warn!(error = %err, items = topics.len(), "Batch rejected");
            return Err(err);
        }

        let run_id = Uuid::new_v4();
        let total = topics.len();
        let token = CancellationToken::new();
        let now = self.inner.deps.clock.now();

        tracing::info!(
            run_id = %run_id,
            total,
            mode = %schedule.mode,
            approval_required,
            "Batch started"
        );

        *state = QueueState::started(run_id, topics, schedule, approval_required, token.clone(), now);
        drop(state);

        metrics::set_queue_active(true);
        *task = Some(tokio::spawn(drive(Arc::clone(&self.inner), run_id, token)));

        Ok(StartAck {
            accepted: true,
            run_id,
            total,
        })
    }

    /// Wait for the previous run's task unless that run is still active
    async fn settle_previous(&self, task: &mut Option<JoinHandle<()>>) {
        let Some(previous) = task.take() else {
            return;
        };

        if self.inner.state.read().await.active {
            *task = Some(previous);
            return;
        }

        if !previous.is_finished() {
            tracing::debug!("Waiting for the cancelled run to settle");
        }
        if let Err(e) = previous.await {
            tracing::warn!(error = %e, "Previous drive task ended abnormally");
        }
    }

    /// Cancel the active batch
    ///
    /// Disarms the pending timer and ends a pending approval, which records
    /// the item as cancelled. A publish already in flight finishes and its
    /// result is still recorded.
    pub async fn cancel(&self) -> QueueResult<CancelAck> {
        let mut state = self.inner.state.write().await;

        let Some(run_id) = state.run_id.filter(|_| state.active) else {
            return Err(QueueError::NotActive);
        };

        state.deactivate(QueuePhase::Cancelled);
        let processed = state.cursor;
        let results = state.results.clone();

        tracing::info!(run_id = %run_id, processed, total = state.total(), "Batch cancelled");
        self.inner.emit(QueueEvent::Cancelled {
            run_id,
            processed,
            total: state.total(),
            results: results.clone(),
        });
        metrics::set_queue_active(false);

        Ok(CancelAck { processed, results })
    }

    /// Snapshot of the queue
    pub async fn status(&self) -> QueueStatus {
        self.inner.state.read().await.snapshot()
    }
}

// ============================================================================
// Drive Loop
// ============================================================================

/// Item picked at the cursor
struct Step {
    position: usize,
    topic: String,
    total: usize,
    schedule: ScheduleConfig,
    approval_required: bool,
}

async fn drive(inner: Arc<Inner>, run_id: Uuid, cancel: CancellationToken) {
    loop {
        let Some(step) = next_step(&inner, run_id).await else {
            return;
        };

        let now = inner.deps.clock.now();
        let scheduled = match schedule::delay(&step.schedule, step.position, now) {
            Ok(scheduled) => scheduled,
            Err(e) => {
                tracing::warn!(run_id = %run_id, position = step.position, error = %e, "Schedule calculation failed");
                let outcome = ItemOutcome::Failed {
                    stage: FailureStage::Schedule,
                    error: e.to_string(),
                };
                record(&inner, run_id, &step, outcome, None).await;
                continue;
            }
        };
        let publish_at = scheduled.publish_at(now);

        {
            let mut state = inner.state.write().await;
            if !state.is_live(run_id) {
                return;
            }
            state.phase = QueuePhase::Waiting;
            state.next_publish_at = Some(publish_at);

            tracing::info!(
                run_id = %run_id,
                position = step.position,
                topic = %step.topic,
                delay_ms = scheduled.delay.as_millis() as u64,
                publish_at = %publish_at,
                fallback = scheduled.is_fallback(),
                "Waiting for next publish slot"
            );
            inner.emit(QueueEvent::Waiting {
                run_id,
                cursor: step.position,
                total: step.total,
                item: step.topic.clone(),
                publish_at,
                delay_ms: scheduled.delay.as_millis() as u64,
                source: scheduled.source.clone(),
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(run_id = %run_id, "Drive loop stopped while waiting");
                return;
            }
            _ = tokio::time::sleep(scheduled.delay) => {}
        }

        {
            let mut state = inner.state.write().await;
            // A cancel may have landed while the timer fired
            if !state.is_live(run_id) {
                return;
            }
            state.phase = QueuePhase::Processing;
            state.next_publish_at = None;

            tracing::info!(run_id = %run_id, position = step.position, topic = %step.topic, "Processing item");
            inner.emit(QueueEvent::Processing {
                run_id,
                cursor: step.position,
                total: step.total,
                item: step.topic.clone(),
            });
        }

        let processed = process_item(&inner, &step.topic, step.approval_required, &cancel).await;
        record(&inner, run_id, &step, processed.outcome, processed.content).await;
    }
}

/// Pick the item at the cursor, or finish the run
async fn next_step(inner: &Inner, run_id: Uuid) -> Option<Step> {
    let mut state = inner.state.write().await;
    if !state.is_live(run_id) {
        return None;
    }

    if state.cursor >= state.items.len() {
        state.deactivate(QueuePhase::Completed);
        let processed = state.cursor;

        tracing::info!(run_id = %run_id, processed, "Batch completed");
        inner.emit(QueueEvent::Completed {
            run_id,
            processed,
            total: state.total(),
            results: state.results.clone(),
        });
        metrics::set_queue_active(false);
        return None;
    }

    Some(Step {
        position: state.cursor,
        topic: state.items[state.cursor].topic.clone(),
        total: state.total(),
        schedule: state.schedule.clone(),
        approval_required: state.approval_required,
    })
}

/// Store an item's result and advance the cursor
///
/// Results from a superseded run are dropped. A result for the current run
/// is recorded even if the run was cancelled while the item was processing.
async fn record(
    inner: &Inner,
    run_id: Uuid,
    step: &Step,
    outcome: ItemOutcome,
    content: Option<(Draft, Option<Attachment>)>,
) {
    let mut state = inner.state.write().await;
    if state.run_id != Some(run_id) {
        tracing::warn!(
            run_id = %run_id,
            position = step.position,
            outcome = outcome.label(),
            "Dropping result of a superseded run"
        );
        return;
    }

    let result = ItemResult {
        position: step.position,
        topic: step.topic.clone(),
        outcome,
        finished_at: inner.deps.clock.now(),
    };

    if let Some(item) = state.items.get_mut(step.position) {
        item.status = result.outcome.status();
        if let Some((draft, attachment)) = content {
            item.draft = Some(draft);
            item.attachment = attachment;
        }
    }
    state.results.push(result.clone());
    state.cursor = state.cursor.max(step.position + 1);

    metrics::record_item(result.outcome.label());
    match &result.outcome {
        ItemOutcome::Failed { stage, error } => tracing::warn!(
            run_id = %run_id,
            position = step.position,
            stage = stage.as_str(),
            error = %error,
            "Item failed"
        ),
        outcome => tracing::info!(
            run_id = %run_id,
            position = step.position,
            outcome = outcome.label(),
            "Item settled"
        ),
    }

    inner.emit(QueueEvent::ItemSettled {
        run_id,
        cursor: step.position,
        total: step.total,
        item: step.topic.clone(),
        result,
    });
}

// ============================================================================
// Item Pipeline
// ============================================================================

struct Processed {
    outcome: ItemOutcome,
    content: Option<(Draft, Option<Attachment>)>,
}

impl Processed {
    fn failed(stage: FailureStage, error: impl ToString) -> Self {
        Self {
            outcome: ItemOutcome::Failed {
                stage,
                error: error.to_string(),
            },
            content: None,
        }
    }
}

/// Generate, optionally approve, then publish one item
async fn process_item(
    inner: &Inner,
    topic: &str,
    approval_required: bool,
    cancel: &CancellationToken,
) -> Processed {
    let deps = &inner.deps;

    let generated = match deps.generator.generate(topic).await {
        Ok(content) => content.into_checked(topic),
        Err(e) => Err(e),
    };
    let (mut draft, mut attachment) = match generated {
        Ok(content) => content,
        Err(e) => return Processed::failed(FailureStage::Generation, e),
    };

    if attachment.is_none() && inner.config.auto_attach {
        if let Some(source) = &deps.attachments {
            attachment = source.select_for(topic).await;
        }
    }

    let gate = if approval_required {
        let Some(gate) = &deps.gate else {
            return Processed::failed(FailureStage::Approval, QueueError::ApprovalUnavailable);
        };

        let request = ApprovalRequest {
            topic,
            draft,
            attachment,
            timeout: inner.config.approval_timeout_secs.map(Duration::from_secs),
            regenerator: deps.generator.as_ref(),
            cancel: Some(cancel.clone()),
        };

        match gate.request_approval(request).await {
            Ok(outcome) if outcome.is_approved() => {
                draft = outcome.draft;
                attachment = outcome.attachment;
                Some(gate)
            }
            Ok(outcome) => {
                return Processed {
                    outcome: ItemOutcome::Cancelled {
                        decision: outcome.decision,
                    },
                    content: Some((outcome.draft, outcome.attachment)),
                }
            }
            Err(e) => return Processed::failed(FailureStage::Approval, e),
        }
    } else {
        None
    };

    let request = PublishRequest::new(&draft, attachment.as_ref(), inner.config.make_live);
    let published = {
        let _timer = metrics::start_publish_timer();
        deps.publisher.publish(&request).await
    };

    let outcome = match published {
        Ok(receipt) => {
            if let Some(gate) = gate {
                gate.notify(&format!("✅ Published: {}", receipt.link)).await;
            }
            ItemOutcome::Published {
                id: receipt.id,
                link: receipt.link,
            }
        }
        Err(e) => {
            if let Some(gate) = gate {
                gate.notify(&format!("⚠️ Publishing failed: {e}")).await;
            }
            ItemOutcome::Failed {
                stage: FailureStage::Publish,
                error: e.to_string(),
            }
        }
    };

    Processed {
        outcome,
        content: Some((draft, attachment)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::generator::{GeneratedContent, GenerationError, GenerationResult};
    use crate::publisher::{PublishError, PublishReceipt, PublishResult};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;

    struct EchoGenerator;

    #[async_trait]
    impl ContentGenerator for EchoGenerator {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, topic: &str) -> GenerationResult<GeneratedContent> {
            if topic == "broken" {
                return Err(GenerationError::Rejected("no".into()));
            }
            Ok(GeneratedContent::new(Draft::new(topic, format!("about {topic}"))))
        }
    }

    #[derive(Default)]
    struct MemoryPublisher {
        published: Mutex<Vec<PublishRequest>>,
    }

    #[async_trait]
    impl PublishTarget for MemoryPublisher {
        fn name(&self) -> &str {
            "memory"
        }

        async fn publish(&self, request: &PublishRequest) -> PublishResult<PublishReceipt> {
            if request.body.contains("reject") {
                return Err(PublishError::Rejected {
                    status: 400,
                    body: "bad".into(),
                });
            }
            let mut published = self.published.lock();
            published.push(request.clone());
            Ok(PublishReceipt {
                id: published.len().to_string(),
                link: format!("https://blog.test/{}", published.len()),
            })
        }
    }

    fn queue(publisher: Arc<MemoryPublisher>) -> PublishQueue {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap());
        PublishQueue::new(
            QueueDeps {
                generator: Arc::new(EchoGenerator),
                publisher,
                gate: None,
                attachments: None,
                clock: Arc::new(clock),
            },
            QueueConfig::default(),
        )
    }

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    async fn wait_final(rx: &mut broadcast::Receiver<QueueEvent>) -> QueueEvent {
        loop {
            let event = rx.recv().await.unwrap();
            if event.is_final() {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_batch_completes() {
        let publisher = Arc::new(MemoryPublisher::default());
        let queue = queue(publisher.clone());
        let mut rx = queue.subscribe();

        let ack = queue
            .start(topics(&["a", "b", "c"]), ScheduleConfig::immediate(), false)
            .await
            .unwrap();
        assert_eq!(ack.total, 3);

        let event = wait_final(&mut rx).await;
        assert!(matches!(event, QueueEvent::Completed { processed: 3, .. }));

        let status = queue.status().await;
        assert!(!status.active);
        assert_eq!(status.phase, QueuePhase::Completed);
        assert_eq!(status.results.len(), 3);
        assert_eq!(publisher.published.lock().len(), 3);
        assert!(!publisher.published.lock()[0].make_live);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_leave_state_unchanged() {
        let queue = queue(Arc::new(MemoryPublisher::default()));

        assert_eq!(
            queue.start(vec![], ScheduleConfig::immediate(), false).await,
            Err(QueueError::EmptyBatch)
        );
        let eleven: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        assert_eq!(
            queue.start(eleven, ScheduleConfig::immediate(), false).await,
            Err(QueueError::BatchTooLarge { len: 11, max: 10 })
        );
        assert_eq!(
            queue.start(topics(&["a"]), ScheduleConfig::immediate(), true).await,
            Err(QueueError::ApprovalUnavailable)
        );
        assert!(matches!(
            queue
                .start(topics(&["a"]), ScheduleConfig::fixed_interval(-1.0), false)
                .await,
            Err(QueueError::InvalidSchedule(_))
        ));

        assert_eq!(queue.status().await.phase, QueuePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_abort_batch() {
        let publisher = Arc::new(MemoryPublisher::default());
        let queue = queue(publisher.clone());
        let mut rx = queue.subscribe();

        queue
            .start(topics(&["broken", "reject", "ok"]), ScheduleConfig::immediate(), false)
            .await
            .unwrap();
        wait_final(&mut rx).await;

        let status = queue.status().await;
        let outcomes: Vec<_> = status.results.iter().map(|r| r.outcome.clone()).collect();
        assert!(matches!(
            outcomes[0],
            ItemOutcome::Failed { stage: FailureStage::Generation, .. }
        ));
        assert!(matches!(
            outcomes[1],
            ItemOutcome::Failed { stage: FailureStage::Publish, .. }
        ));
        assert!(matches!(outcomes[2], ItemOutcome::Published { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_timer_fires() {
        let queue = queue(Arc::new(MemoryPublisher::default()));

        queue
            .start(topics(&["a", "b"]), ScheduleConfig::fixed_interval(1.0), false)
            .await
            .unwrap();
        // The drive task has not run yet
        let ack = queue.cancel().await.unwrap();
        assert_eq!(ack.processed, 0);

        tokio::time::sleep(Duration::from_secs(7200)).await;
        let status = queue.status().await;
        assert_eq!(status.cursor, 0);
        assert!(status.results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_when_idle_fails() {
        let queue = queue(Arc::new(MemoryPublisher::default()));
        assert_eq!(queue.cancel().await, Err(QueueError::NotActive));
    }

    #[tokio::test(start_paused = true)]
    async fn test_make_live_flag() {
        let publisher = Arc::new(MemoryPublisher::default());
        let clock = ManualClock::new(Utc::now());
        let queue = PublishQueue::new(
            QueueDeps {
                generator: Arc::new(EchoGenerator),
                publisher: publisher.clone(),
                gate: None,
                attachments: None,
                clock: Arc::new(clock),
            },
            QueueConfig {
                make_live: true,
                ..Default::default()
            },
        );
        let mut rx = queue.subscribe();

        queue
            .start(topics(&["a"]), ScheduleConfig::immediate(), false)
            .await
            .unwrap();
        wait_final(&mut rx).await;
        assert!(publisher.published.lock()[0].make_live);
    }
}
