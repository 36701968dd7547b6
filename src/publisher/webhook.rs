//! Webhook publish target
//!
//! POSTs a [`PublishRequest`] as JSON and expects `{"id": …, "link": …}`
//! back. Transport errors and 5xx responses are retried with backoff.

use async_trait::async_trait;

use super::{PublishError, PublishReceipt, PublishRequest, PublishResult, PublishTarget};
use crate::utils::webhook::{WebhookClient, WebhookConfig};

/// Publish target reached over HTTP
pub struct WebhookPublisher {
    client: WebhookClient,
}

impl WebhookPublisher {
    /// Create a publisher
    pub fn new(config: WebhookConfig) -> PublishResult<Self> {
        let client = WebhookClient::new(config)?;
        Ok(Self { client })
    }

    /// Target URL
    pub fn url(&self) -> &str {
        self.client.url()
    }
}

#[async_trait]
impl PublishTarget for WebhookPublisher {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn publish(&self, request: &PublishRequest) -> PublishResult<PublishReceipt> {
        let response = self.client.post_json(None, request).await?;

        let receipt: PublishReceipt = response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;

        tracing::info!(
            id = %receipt.id,
            link = %receipt.link,
            make_live = request.make_live,
            "Content published"
        );
        Ok(receipt)
    }
}
