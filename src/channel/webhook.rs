//! Webhook operator channel
//!
//! Posts presentations and notices as JSON to an operator bridge (for example
//! a chat bot) and leaves inbound replies to the control server's
//! `POST /api/operator/replies` endpoint.
//!
//! # Payload Format
//!
//! Every request body carries a `type` field:
//!
//! ```json
//! { "type": "present", "handle": "…", "topic": "…", "round": 1,
//!   "draft": { "title": "…", "body": "…" }, "attachment": null,
//!   "controls": [ { "decision": "approve", "label": "✅ Publish" } ] }
//! { "type": "invalidate", "handle": "…" }
//! { "type": "request_text", "handle": "…", "prompt": "…" }
//! { "type": "attachments", "handle": "…", "choices": [ … ] }
//! { "type": "notify", "message": "…" }
//! ```
//!
//! The bridge answers by posting an [`InboundReply`](super::InboundReply)
//! that echoes `handle`.

use async_trait::async_trait;
use serde::Serialize;

use super::{ChannelResult, OperatorChannel, Presentation, PresentationHandle};
use crate::models::{Attachment, Decision, Draft};
use crate::utils::webhook::{WebhookClient, WebhookConfig};

#[derive(Debug, Serialize)]
struct Control {
    decision: Decision,
    label: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outbound<'a> {
    Present {
        handle: &'a PresentationHandle,
        topic: &'a str,
        round: u32,
        draft: &'a Draft,
        attachment: Option<&'a Attachment>,
        controls: Vec<Control>,
    },
    Invalidate {
        handle: &'a PresentationHandle,
    },
    RequestText {
        handle: &'a PresentationHandle,
        prompt: &'a str,
    },
    Attachments {
        handle: &'a PresentationHandle,
        choices: &'a [Attachment],
    },
    Notify {
        message: &'a str,
    },
}

/// Operator channel backed by an HTTP bridge
pub struct WebhookChannel {
    client: WebhookClient,
}

impl WebhookChannel {
    /// Create a new webhook channel
    pub fn new(config: WebhookConfig) -> ChannelResult<Self> {
        let client = WebhookClient::new(config)?;
        Ok(Self { client })
    }

    /// Create a simple webhook channel with just a URL
    pub fn from_url(url: impl Into<String>) -> ChannelResult<Self> {
        Self::new(WebhookConfig::new(url))
    }

    /// Get the bridge URL
    pub fn url(&self) -> &str {
        self.client.url()
    }

    async fn send(&self, message: &Outbound<'_>) -> ChannelResult<()> {
        self.client.post_json(None, message).await?;
        Ok(())
    }
}

#[async_trait]
impl OperatorChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn present(&self, presentation: &Presentation) -> ChannelResult<PresentationHandle> {
        let handle = PresentationHandle::generate();
        let controls = presentation
            .controls
            .iter()
            .map(|&decision| Control {
                decision,
                label: decision.label(),
            })
            .collect();

        self.send(&Outbound::Present {
            handle: &handle,
            topic: &presentation.topic,
            round: presentation.round,
            draft: &presentation.draft,
            attachment: presentation.attachment.as_ref(),
            controls,
        })
        .await?;

        tracing::info!(handle = %handle, url = %self.url(), "Presentation delivered to operator bridge");
        Ok(handle)
    }

    async fn invalidate_controls(&self, handle: &PresentationHandle) -> ChannelResult<()> {
        self.send(&Outbound::Invalidate { handle }).await
    }

    async fn request_text(&self, handle: &PresentationHandle, prompt: &str) -> ChannelResult<()> {
        self.send(&Outbound::RequestText { handle, prompt }).await
    }

    async fn present_attachments(
        &self,
        handle: &PresentationHandle,
        choices: &[Attachment],
    ) -> ChannelResult<()> {
        self.send(&Outbound::Attachments { handle, choices }).await
    }

    async fn notify(&self, message: &str) -> ChannelResult<()> {
        self.send(&Outbound::Notify { message }).await
    }

    async fn health_check(&self) -> ChannelResult<bool> {
        Ok(self.client.is_reachable().await)
    }

    fn config(&self) -> serde_json::Value {
        let config = self.client.config();
        serde_json::json!({
            "name": self.name(),
            "url": config.url,
            "timeout_secs": config.timeout_secs,
            "max_retries": config.max_retries,
            "has_auth": config.auth_token.is_some(),
            "custom_headers": config.headers.keys().collect::<Vec<_>>(),
        })
    }
}
