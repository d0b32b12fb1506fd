//! Webhook transport over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::{DeliveryError, WebhookTransport};

/// Posts JSON payloads to chat-style incoming webhooks.
#[derive(Clone)]
pub struct HttpWebhookTransport {
    client: Client,
}

impl HttpWebhookTransport {
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<String, DeliveryError> {
        tracing::debug!(target_url = %redacted_target(url), "Posting webhook notification");

        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

/// `scheme://host` form of a webhook URL, safe to log.
pub fn redacted_target(webhook_url: &str) -> String {
    Url::parse(webhook_url)
        .ok()
        .map(|parsed| {
            let scheme = parsed.scheme();
            let host = parsed.host_str().unwrap_or("unknown");
            format!("{}://{}", scheme, host)
        })
        .unwrap_or_else(|| "[invalid-url]".to_string())
}
