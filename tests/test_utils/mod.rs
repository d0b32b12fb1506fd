//! Test utilities shared by the integration tests.
//!
//! Provides an in-memory SQLite database with migrations applied, recording
//! notification transports, a store wrapper that injects write failures, and a
//! fully wired [`PonyService`] driven by a [`ManualClock`].

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keeper::clock::{Clock, ManualClock};
use keeper::error::RepositoryError;
use keeper::models::PonyStatus;
use keeper::models::history::Model as HistoryModel;
use keeper::models::pony::Model as PonyModel;
use keeper::notification::{DeliveryError, Dispatcher, EmailTransport, WebhookTransport};
use keeper::repositories::{LivenessGuard, PonyStore, SeaOrmPonyStore};
use keeper::service::{NewPony, PonyService};
use keeper::tasks::TaskRunner;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection, DbErr};
use uuid::Uuid;

pub const PASSCODE: &str = "s3cret";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// E-mail transport that records messages, optionally failing every send.
#[derive(Default)]
pub struct RecordingEmail {
    pub sent: Mutex<Vec<SentEmail>>,
    pub fail: AtomicBool,
}

impl RecordingEmail {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailTransport for RecordingEmail {
    async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Webhook transport that records payloads and answers with a configurable body.
pub struct RecordingWebhook {
    pub posts: Mutex<Vec<(String, serde_json::Value)>>,
    pub reply: Mutex<String>,
}

impl Default for RecordingWebhook {
    fn default() -> Self {
        Self {
            posts: Mutex::new(Vec::new()),
            reply: Mutex::new("ok".to_string()),
        }
    }
}

impl RecordingWebhook {
    pub fn posts(&self) -> Vec<(String, serde_json::Value)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn reply_with(&self, body: &str) {
        *self.reply.lock().unwrap() = body.to_string();
    }
}

#[async_trait]
impl WebhookTransport for RecordingWebhook {
    async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<String, DeliveryError> {
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        Ok(self.reply.lock().unwrap().clone())
    }
}

/// Store wrapper whose writes can be made to fail, globally or for one pony.
/// `stale_liveness_writes` makes that many liveness writes report a concurrently
/// changed row without writing anything. `replayed_scan` is handed out once as the
/// result of the next status scan.
pub struct FlakyStore {
    inner: SeaOrmPonyStore,
    pub fail_writes: AtomicBool,
    pub fail_for: Mutex<Option<String>>,
    pub stale_liveness_writes: AtomicU32,
    pub replayed_scan: Mutex<Option<Vec<PonyModel>>>,
}

impl FlakyStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            inner: SeaOrmPonyStore::new(db),
            fail_writes: AtomicBool::new(false),
            fail_for: Mutex::new(None),
            stale_liveness_writes: AtomicU32::new(0),
            replayed_scan: Mutex::new(None),
        }
    }

    fn check(&self, pony: &PonyModel) -> Result<(), RepositoryError> {
        let targeted = self.fail_for.lock().unwrap().as_deref() == Some(pony.name.as_str());
        if self.fail_writes.load(Ordering::SeqCst) || targeted {
            return Err(RepositoryError::Database(DbErr::Custom(
                "injected write failure".to_string(),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PonyStore for FlakyStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<PonyModel>, RepositoryError> {
        self.inner.get_by_name(name).await
    }

    async fn insert(&self, pony: PonyModel) -> Result<PonyModel, RepositoryError> {
        self.inner.insert(pony).await
    }

    async fn save_settings(&self, pony: &PonyModel) -> Result<PonyModel, RepositoryError> {
        self.check(pony)?;
        self.inner.save_settings(pony).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.inner.delete(id).await
    }

    async fn list_by_status(&self, status: PonyStatus) -> Result<Vec<PonyModel>, RepositoryError> {
        if let Some(snapshot) = self.replayed_scan.lock().unwrap().take() {
            return Ok(snapshot);
        }
        self.inner.list_by_status(status).await
    }

    async fn append_history(&self, record: HistoryModel) -> Result<HistoryModel, RepositoryError> {
        self.inner.append_history(record).await
    }

    async fn list_history(
        &self,
        pony_id: Uuid,
        limit: u64,
    ) -> Result<Vec<HistoryModel>, RepositoryError> {
        self.inner.list_history(pony_id, limit).await
    }

    async fn save_liveness(
        &self,
        pony: &PonyModel,
        expected: &LivenessGuard,
        record: Option<HistoryModel>,
    ) -> Result<Option<PonyModel>, RepositoryError> {
        self.check(pony)?;
        let stale = self
            .stale_liveness_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.save_liveness(pony, expected, record).await
    }
}

/// A wired service plus handles on everything a test wants to poke at.
pub struct Harness {
    pub db: DatabaseConnection,
    pub store: Arc<FlakyStore>,
    pub service: Arc<PonyService>,
    pub clock: Arc<ManualClock>,
    pub email: Arc<RecordingEmail>,
    pub webhook: Arc<RecordingWebhook>,
    pub runner: Arc<TaskRunner>,
}

impl Harness {
    pub async fn new() -> Result<Self> {
        let db = setup_test_db().await?;
        let store = Arc::new(FlakyStore::new(db.clone()));
        let clock = Arc::new(ManualClock::new(start_time()));
        let email = Arc::new(RecordingEmail::default());
        let webhook = Arc::new(RecordingWebhook::default());
        let runner = Arc::new(TaskRunner::new(3));

        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let dispatcher = Arc::new(Dispatcher::new(
            email.clone(),
            webhook.clone(),
            dyn_clock.clone(),
        ));
        let service = Arc::new(PonyService::new(
            store.clone(),
            dispatcher,
            runner.clone(),
            dyn_clock,
        ));

        Ok(Self {
            db,
            store,
            service,
            clock,
            email,
            webhook,
            runner,
        })
    }

    /// Register an e-mail pony with the shared test passcode.
    pub async fn add_email_pony(&self, name: &str, dark_minute: i32) -> PonyModel {
        self.service
            .add_pony(NewPony {
                name: name.to_string(),
                passcode: PASSCODE.to_string(),
                dark_minute,
                notify_channel: "email".to_string(),
                notify_url: format!("{name}@example.com"),
            })
            .await
            .expect("pony registers")
    }

    /// Register a webhook pony with the shared test passcode.
    pub async fn add_webhook_pony(&self, name: &str, dark_minute: i32) -> PonyModel {
        self.service
            .add_pony(NewPony {
                name: name.to_string(),
                passcode: PASSCODE.to_string(),
                dark_minute,
                notify_channel: "webhook".to_string(),
                notify_url: format!("https://hooks.example.com/{name}"),
            })
            .await
            .expect("pony registers")
    }

    pub async fn history(&self, name: &str) -> Vec<(String, String)> {
        self.service
            .list_history(name, PASSCODE, 100)
            .await
            .expect("history readable")
            .into_iter()
            .map(|h| (h.previous_status, h.current_status))
            .collect()
    }

    pub async fn status(&self, name: &str) -> String {
        self.service
            .get_pony(name, PASSCODE)
            .await
            .expect("pony readable")
            .status
    }
}
