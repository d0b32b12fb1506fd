//! # Pony Keeper Library
//!
//! Liveness monitoring: ponies send heartbeats, a sweep marks the silent ones
//! missing, and every status change is recorded and announced over e-mail or webhook.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod liveness;
pub mod models;
pub mod notification;
pub mod repositories;
pub mod server;
pub mod service;
pub mod sweep;
pub mod tasks;
pub mod telemetry;
pub mod validation;
pub use migration;
