pub mod check;
pub mod run;
pub mod serve;

use anyhow::{Context, Result};
use std::sync::Arc;

use autopost::approval::{ApprovalGate, ReplyInbox};
use autopost::attachments::{AttachmentSource, DirectoryAttachments};
use autopost::channel::{ConsoleChannel, OperatorChannel, WebhookChannel};
use autopost::clock::SystemClock;
use autopost::config::{ChannelKind, Config};
use autopost::generator::LlmGenerator;
use autopost::publisher::WebhookPublisher;
use autopost::queue::{PublishQueue, QueueDeps};

pub use check::check_config;
pub use run::{run, RunParams};
pub use serve::{serve, ServeParams};

/// Queue and operator plumbing built from a [`Config`]
pub struct Components {
    pub queue: PublishQueue,
    pub inbox: ReplyInbox,
    /// Set when the operator is on this terminal
    pub console: Option<Arc<ConsoleChannel>>,
}

impl Components {
    /// Wire generator, publisher, attachments and the operator channel
    pub fn build(config: &Config, channel: ChannelKind) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let generator = Arc::new(
            LlmGenerator::with_config(config.generator.clone())
                .context("Failed to create generator")?,
        );
        let publisher = Arc::new(
            WebhookPublisher::new(config.publisher.clone()).context("Failed to create publisher")?,
        );
        let attachments: Option<Arc<dyn AttachmentSource>> = config
            .attachments
            .dir
            .as_ref()
            .map(|dir| Arc::new(DirectoryAttachments::new(dir)) as Arc<dyn AttachmentSource>);

        let (operator, console): (Arc<dyn OperatorChannel>, Option<Arc<ConsoleChannel>>) =
            match channel {
                ChannelKind::Console => {
                    let console = Arc::new(ConsoleChannel::stdout());
                    (console.clone() as Arc<dyn OperatorChannel>, Some(console))
                }
                ChannelKind::Webhook => {
                    let webhook = config
                        .channel
                        .webhook
                        .clone()
                        .context("channel.webhook is required for the webhook channel")?;
                    let channel =
                        WebhookChannel::new(webhook).context("Failed to create operator channel")?;
                    (Arc::new(channel) as Arc<dyn OperatorChannel>, None)
                }
            };

        let inbox = ReplyInbox::new();
        let mut gate = ApprovalGate::new(operator, inbox.clone(), config.approval.clone());
        if let Some(source) = &attachments {
            gate = gate.with_attachments(Arc::clone(source));
        }

        let queue = PublishQueue::new(
            QueueDeps {
                generator,
                publisher,
                gate: Some(Arc::new(gate)),
                attachments,
                clock: Arc::new(SystemClock),
            },
            config.queue.clone(),
        );

        tracing::debug!(channel = channel.as_str(), "Components ready");

        Ok(Self {
            queue,
            inbox,
            console,
        })
    }

    /// Start reading operator replies from stdin, if the operator is local
    pub fn attach_console_input(&self) {
        if let Some(console) = &self.console {
            console.spawn_stdin_reader(self.inbox.clone());
        }
    }
}
