//! # Data Models
//!
//! This module contains all the data models used throughout the Keeper service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod history;
pub mod pony;

pub use history::Entity as History;
pub use pony::{Entity as Pony, PonyStatus};

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "pony-keeper".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
