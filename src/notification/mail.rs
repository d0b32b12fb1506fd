//! E-mail transport that hands messages to an HTTP mail relay.
//!
//! The relay receives `{"from", "to", "subject", "text"}` as JSON, optionally
//! authenticated with a bearer token. Any 2xx response counts as accepted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{DeliveryError, EmailTransport};
use crate::config::MailConfig;

#[derive(Clone)]
pub struct HttpMailTransport {
    client: Client,
    api_url: Option<String>,
    api_token: Option<String>,
    from: String,
}

impl HttpMailTransport {
    pub fn new(config: &MailConfig, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl EmailTransport for HttpMailTransport {
    async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), DeliveryError> {
        let Some(api_url) = self.api_url.as_deref() else {
            return Err(DeliveryError::NotConfigured);
        };

        let mut request = self.client.post(api_url).json(&json!({
            "from": self.from,
            "to": to,
            "subject": subject,
            "text": text,
        }));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
