//! # Notification Dispatch
//!
//! Renders a status-change message and delivers it over the pony's channel. Every
//! failure is logged and reduced to `false` at [`Dispatcher::notify`]; nothing is
//! retried and nothing propagates back into the transition that triggered it.

pub mod mail;
pub mod message;
pub mod webhook;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde_json::json;
use thiserror::Error;

use crate::clock::Clock;
use crate::models::PonyStatus;
use crate::models::pony::Model as PonyModel;

pub use mail::HttpMailTransport;
pub use message::Message;
pub use webhook::{HttpWebhookTransport, redacted_target};

/// Webhook response body that signals acceptance.
const WEBHOOK_ACK: &str = "ok";

/// Delivery channel of a pony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyChannel {
    Email,
    Webhook,
}

impl NotifyChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyChannel::Email => "email",
            NotifyChannel::Webhook => "webhook",
        }
    }
}

impl fmt::Display for NotifyChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown notification channel '{0}' (expected 'email' or 'webhook')")]
pub struct UnknownChannel(pub String);

impl FromStr for NotifyChannel {
    type Err = UnknownChannel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "email" => Ok(NotifyChannel::Email),
            "webhook" => Ok(NotifyChannel::Webhook),
            other => Err(UnknownChannel(other.to_string())),
        }
    }
}

/// Failure of a single delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("endpoint responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("endpoint did not acknowledge the message: {body:?}")]
    Rejected { body: String },
    #[error("mail relay is not configured")]
    NotConfigured,
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Transport(err.to_string())
    }
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), DeliveryError>;
}

#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// POST `payload` and return the raw response body.
    async fn post_json(&self, url: &str, payload: &serde_json::Value)
    -> Result<String, DeliveryError>;
}

/// Delivers status-change notifications.
pub struct Dispatcher {
    email: Arc<dyn EmailTransport>,
    webhook: Arc<dyn WebhookTransport>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        email: Arc<dyn EmailTransport>,
        webhook: Arc<dyn WebhookTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            email,
            webhook,
            clock,
        }
    }

    /// Notify the pony's owner of `previous -> current`.
    ///
    /// Returns `true` when delivery succeeded or there was nothing to send.
    pub async fn notify(&self, pony: &PonyModel, previous: PonyStatus, current: PonyStatus) -> bool {
        if previous == current {
            return true;
        }

        let channel = match pony.notify_channel.parse::<NotifyChannel>() {
            Ok(channel) => channel,
            Err(err) => {
                tracing::error!(pony = %pony.name, error = %err, "Cannot dispatch notification");
                counter!("keeper_notifications_total", "channel" => "unknown", "outcome" => "failed")
                    .increment(1);
                return false;
            }
        };

        let message = message::render(pony, previous, current, self.clock.now());
        let result = match channel {
            NotifyChannel::Email => {
                self.email
                    .send(&pony.notify_url, &message.title, &message.body)
                    .await
            }
            NotifyChannel::Webhook => self.send_webhook(&pony.notify_url, &message).await,
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    pony = %pony.name,
                    channel = %channel,
                    previous = %previous,
                    current = %current,
                    "Notification delivered"
                );
                counter!("keeper_notifications_total", "channel" => channel.as_str(), "outcome" => "delivered")
                    .increment(1);
                true
            }
            Err(err) => {
                let target = match channel {
                    NotifyChannel::Email => "[email]".to_string(),
                    NotifyChannel::Webhook => redacted_target(&pony.notify_url),
                };
                tracing::warn!(
                    pony = %pony.name,
                    channel = %channel,
                    target = %target,
                    error = %err,
                    "Notification delivery failed"
                );
                counter!("keeper_notifications_total", "channel" => channel.as_str(), "outcome" => "failed")
                    .increment(1);
                false
            }
        }
    }

    async fn send_webhook(&self, url: &str, message: &Message) -> Result<(), DeliveryError> {
        let payload = json!({ "text": message.as_text() });
        let body = self.webhook.post_json(url, &payload).await?;

        if body == WEBHOOK_ACK {
            Ok(())
        } else {
            Err(DeliveryError::Rejected { body })
        }
    }
}
