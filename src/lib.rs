//! autopost - Scheduled, human-approved publishing queue
//!
//! Takes a batch of topics, generates a draft for each, optionally holds it
//! for an operator's decision, and publishes it, pacing the items by a
//! schedule.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`schedule`] - Delay calculation for immediate, interval and daily-time pacing
//! - [`approval`] - Approval gate and reply correlation
//! - [`channel`] - Operator channels (console, webhook)
//! - [`queue`] - Batch state machine and drive loop
//! - [`generator`] - Content generation backends
//! - [`publisher`] - Publish targets
//! - [`attachments`] - Media attachment catalogues
//! - [`server`] - HTTP control surface
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`utils`] - Retry, webhook client and formatting helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use autopost::prelude::*;
//! use autopost::clock::SystemClock;
//! use autopost::generator::LlmGenerator;
//! use autopost::publisher::WebhookPublisher;
//! use autopost::utils::webhook::WebhookConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let queue = PublishQueue::new(
//!         QueueDeps {
//!             generator: Arc::new(LlmGenerator::from_env()?),
//!             publisher: Arc::new(WebhookPublisher::new(WebhookConfig::new("http://localhost:9000/publish"))?),
//!             gate: None,
//!             attachments: None,
//!             clock: Arc::new(SystemClock),
//!         },
//!         QueueConfig::default(),
//!     );
//!     queue
//!         .start(vec!["Rust 2024".into()], ScheduleConfig::fixed_interval(1.0), false)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod approval;
pub mod attachments;
pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod models;
pub mod publisher;
pub mod queue;
pub mod schedule;
pub mod server;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::approval::{ApprovalConfig, ApprovalGate, ReplyInbox};
    pub use crate::channel::{ChannelEvent, OperatorChannel, OperatorReply, PresentationHandle};
    pub use crate::config::Config;
    pub use crate::error::{AutopostErrorTrait, Error, ErrorCategory, Result};
    pub use crate::generator::ContentGenerator;
    pub use crate::models::{Decision, Draft, ItemOutcome, ItemResult};
    pub use crate::publisher::PublishTarget;
    pub use crate::queue::{PublishQueue, QueueConfig, QueueDeps, QueueEvent, QueueStatus};
    pub use crate::schedule::{ScheduleConfig, ScheduleMode};
}
