//! Pony entity model
//!
//! This module contains the SeaORM entity model for the ponies table, which stores
//! every monitored pony together with its liveness status and notification target.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Pony entity representing a monitored subject
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ponies")]
pub struct Model {
    /// Unique identifier for the pony (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// User-chosen name, unique and immutable after creation
    pub name: String,

    /// SHA-256 hex digest of the passcode
    pub passcode_hash: String,

    /// Maximum silent interval in minutes before the pony is considered missing
    pub dark_minute: i32,

    /// Timestamp of the most recent heartbeat, absent until the first one
    pub last_hi_time: Option<DateTimeWithTimeZone>,

    /// Liveness status (init|normal|missing)
    pub status: String,

    /// Notification channel discriminator (email|webhook)
    pub notify_channel: String,

    /// Channel-specific address: e-mail address or webhook URL
    pub notify_url: String,

    /// Timestamp when the pony was created
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse the stored status string.
    pub fn liveness(&self) -> Result<PonyStatus, UnknownStatus> {
        self.status.parse()
    }

    /// Most recent heartbeat in UTC.
    pub fn last_hi_utc(&self) -> Option<DateTime<Utc>> {
        self.last_hi_time.map(|at| at.with_timezone(&Utc))
    }
}

/// Liveness status of a pony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PonyStatus {
    /// Created, no heartbeat received yet
    Init,
    /// Heartbeats arriving within tolerance
    Normal,
    /// Silent for longer than tolerance plus grace
    Missing,
}

impl PonyStatus {
    /// Storage representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            PonyStatus::Init => "init",
            PonyStatus::Normal => "normal",
            PonyStatus::Missing => "missing",
        }
    }

    /// Human-readable name used in notification bodies.
    pub fn label(&self) -> &'static str {
        match self {
            PonyStatus::Init => "initialized",
            PonyStatus::Normal => "normal",
            PonyStatus::Missing => "missing",
        }
    }
}

impl fmt::Display for PonyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string that is not one of init, normal or missing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pony status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for PonyStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "init" => Ok(PonyStatus::Init),
            "normal" => Ok(PonyStatus::Normal),
            "missing" => Ok(PonyStatus::Missing),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_storage_values() {
        for status in [PonyStatus::Init, PonyStatus::Normal, PonyStatus::Missing] {
            assert_eq!(status.as_str().parse::<PonyStatus>(), Ok(status));
        }
        assert_eq!(
            "asleep".parse::<PonyStatus>(),
            Err(UnknownStatus("asleep".to_string()))
        );
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let value = serde_json::to_value(PonyStatus::Missing).unwrap();
        assert_eq!(value, serde_json::json!("missing"));
    }
}
