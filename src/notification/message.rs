//! Status-change message rendering.

use chrono::{DateTime, Utc};

use crate::models::PonyStatus;
use crate::models::pony::Model as PonyModel;

/// Rendered notification content, shared by every channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub title: String,
    pub body: String,
}

impl Message {
    /// Text form used by chat webhooks: title and body on separate lines.
    pub fn as_text(&self) -> String {
        format!("{}\n{}", self.title, self.body)
    }
}

pub fn render(
    pony: &PonyModel,
    previous: PonyStatus,
    current: PonyStatus,
    now: DateTime<Utc>,
) -> Message {
    let headline = match (previous, current) {
        (PonyStatus::Init, PonyStatus::Normal) => "first heartbeat received",
        (PonyStatus::Normal, PonyStatus::Missing) => "is now missing",
        (PonyStatus::Missing, PonyStatus::Normal) => "has come back",
        _ => "status changed",
    };

    let title = format!("[{}] {}", pony.name, headline);
    let body = format!(
        "Pony '{}' changed from {} to {}.\nAllowed silence: {} minutes.\nTime: {}",
        pony.name,
        previous.label(),
        current.label(),
        pony.dark_minute,
        now.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    Message { title, body }
}
