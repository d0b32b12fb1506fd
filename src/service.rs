//! # Pony Service
//!
//! Core operations over ponies. Each status change is persisted together with its
//! history record before a notification is queued on the [`TaskRunner`]; a failed
//! write aborts the operation with nothing recorded and nothing sent. Liveness writes
//! only land while the row still holds what was read, so a heartbeat and a sweep racing
//! on one pony cannot overwrite each other.

use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::clock::Clock;
use crate::crypto::hash_passcode;
use crate::error::{KeeperError, RepositoryError};
use crate::liveness::{self, LivenessError, Transition};
use crate::models::PonyStatus;
use crate::models::history::Model as HistoryModel;
use crate::models::pony::Model as PonyModel;
use crate::notification::Dispatcher;
use crate::repositories::{LivenessGuard, PonyStore};
use crate::tasks::{TaskHandle, TaskRunner};
use crate::validation;

pub const DEFAULT_HISTORY_LIMIT: u64 = 20;
pub const MAX_HISTORY_LIMIT: u64 = 100;

/// Heartbeat attempts before giving up on a pony that keeps changing underneath.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Registration input.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPony {
    /// Unique slug, 2-50 characters
    #[schema(example = "backup-job")]
    pub name: String,
    /// Shared secret for heartbeats and management, 3-50 characters
    pub passcode: String,
    /// Allowed silence in minutes (5-43200)
    #[schema(example = 60)]
    pub dark_minute: i32,
    /// `email` or `webhook`
    #[schema(example = "webhook")]
    pub notify_channel: String,
    /// E-mail address or webhook URL matching the channel
    pub notify_url: String,
}

/// Fields that may change after registration. The name never does.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PonyUpdate {
    pub dark_minute: Option<i32>,
    pub notify_channel: Option<String>,
    pub notify_url: Option<String>,
    pub new_passcode: Option<String>,
}

/// Outcome of a heartbeat or timeout.
#[derive(Debug)]
pub struct TransitionResult {
    pub pony: PonyModel,
    pub previous: PonyStatus,
    pub current: PonyStatus,
    pub changed: bool,
    /// Queued notification; `None` when the status did not change.
    pub notification: Option<TaskHandle<bool>>,
}

pub struct PonyService {
    store: Arc<dyn PonyStore>,
    dispatcher: Arc<Dispatcher>,
    runner: Arc<TaskRunner>,
    clock: Arc<dyn Clock>,
}

impl PonyService {
    pub fn new(
        store: Arc<dyn PonyStore>,
        dispatcher: Arc<Dispatcher>,
        runner: Arc<TaskRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            runner,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn PonyStore> {
        &self.store
    }

    pub fn runner(&self) -> &Arc<TaskRunner> {
        &self.runner
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Register a new pony in the `init` state.
    pub async fn add_pony(&self, new: NewPony) -> Result<PonyModel, KeeperError> {
        validation::validate_name(&new.name)?;
        validation::validate_passcode(&new.passcode)?;
        validation::validate_dark_minute(new.dark_minute)?;
        let channel = validation::parse_channel(&new.notify_channel)?;
        validation::validate_target(channel, &new.notify_url)?;

        if self.store.get_by_name(&new.name).await?.is_some() {
            return Err(KeeperError::NameTaken { name: new.name });
        }

        let now = self.clock.now().fixed_offset();
        let pony = PonyModel {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            passcode_hash: hash_passcode(&new.passcode),
            dark_minute: new.dark_minute,
            last_hi_time: None,
            status: PonyStatus::Init.as_str().to_string(),
            notify_channel: channel.as_str().to_string(),
            notify_url: new.notify_url,
            created_at: now,
        };

        // The unique index catches a concurrent registration that slipped past the check.
        let created = self.store.insert(pony).await.map_err(|err| match err {
            RepositoryError::Conflict(_) => KeeperError::NameTaken {
                name: new.name.clone(),
            },
            other => other.into(),
        })?;

        counter!("keeper_ponies_registered_total").increment(1);
        tracing::info!(pony = %created.name, channel = %channel, "Pony registered");

        Ok(created)
    }

    /// Record a heartbeat. Unknown name and wrong passcode both yield `NotFound`.
    ///
    /// The write only lands if the pony's liveness columns are unchanged since it was
    /// read; otherwise the pony is read again and the heartbeat reapplied.
    pub async fn heartbeat(
        &self,
        name: &str,
        passcode: &str,
    ) -> Result<TransitionResult, KeeperError> {
        counter!("keeper_heartbeats_total").increment(1);

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut pony = self.authenticate(name, passcode).await?;
            let expected = LivenessGuard::of(&pony).map_err(LivenessError::from)?;
            let now = self.clock.now();

            let transition = liveness::heartbeat(&mut pony, now)?;
            let record = transition.map(|t| history_record(&pony, &t));

            let Some(saved) = self.store.save_liveness(&pony, &expected, record).await? else {
                tracing::debug!(
                    pony = %name,
                    attempt,
                    "Pony changed concurrently, retrying heartbeat"
                );
                continue;
            };

            return Ok(match transition {
                Some(transition) => self.announce(saved, transition),
                None => {
                    tracing::debug!(pony = %saved.name, "Heartbeat refreshed");
                    TransitionResult {
                        pony: saved,
                        previous: expected.status,
                        current: expected.status,
                        changed: false,
                        notification: None,
                    }
                }
            });
        }

        Err(KeeperError::Contended {
            name: name.to_string(),
        })
    }

    /// Move a `normal` pony to `missing`. Used by the sweep after it has decided the
    /// pony is overdue.
    ///
    /// `pony` is the copy the decision was made on. If the stored row has moved on since
    /// (a heartbeat arrived), nothing is written or sent and the result reports
    /// `changed == false` with the pony's current state.
    pub async fn mark_missing(&self, pony: PonyModel) -> Result<TransitionResult, KeeperError> {
        let expected = LivenessGuard::of(&pony).map_err(LivenessError::from)?;
        let mut pony = pony;
        let transition = liveness::mark_missing(&mut pony, self.clock.now())?;
        let record = history_record(&pony, &transition);

        match self
            .store
            .save_liveness(&pony, &expected, Some(record))
            .await?
        {
            Some(saved) => Ok(self.announce(saved, transition)),
            None => {
                let current = self
                    .store
                    .get_by_name(&pony.name)
                    .await?
                    .ok_or(KeeperError::NotFound)?;
                let status = current.liveness().map_err(LivenessError::from)?;
                tracing::info!(
                    pony = %current.name,
                    status = %status,
                    "Pony changed since it was found overdue; not marking missing"
                );
                Ok(TransitionResult {
                    pony: current,
                    previous: status,
                    current: status,
                    changed: false,
                    notification: None,
                })
            }
        }
    }

    pub async fn get_pony(&self, name: &str, passcode: &str) -> Result<PonyModel, KeeperError> {
        self.authenticate(name, passcode).await
    }

    /// Change tolerance, notification target or passcode. Status and history are
    /// untouched.
    pub async fn update_pony(
        &self,
        name: &str,
        passcode: &str,
        update: PonyUpdate,
    ) -> Result<PonyModel, KeeperError> {
        let mut pony = self.authenticate(name, passcode).await?;

        if let Some(dark_minute) = update.dark_minute {
            validation::validate_dark_minute(dark_minute)?;
            pony.dark_minute = dark_minute;
        }

        if update.notify_channel.is_some() || update.notify_url.is_some() {
            let channel = validation::parse_channel(
                update
                    .notify_channel
                    .as_deref()
                    .unwrap_or(&pony.notify_channel),
            )?;
            let target = update.notify_url.unwrap_or_else(|| pony.notify_url.clone());
            validation::validate_target(channel, &target)?;
            pony.notify_channel = channel.as_str().to_string();
            pony.notify_url = target;
        }

        if let Some(new_passcode) = update.new_passcode {
            validation::validate_passcode(&new_passcode)?;
            pony.passcode_hash = hash_passcode(&new_passcode);
        }

        let saved = self.store.save_settings(&pony).await?;
        tracing::info!(pony = %saved.name, "Pony updated");
        Ok(saved)
    }

    /// Delete a pony. Its history stays behind.
    pub async fn remove_pony(&self, name: &str, passcode: &str) -> Result<(), KeeperError> {
        let pony = self.authenticate(name, passcode).await?;

        if !self.store.delete(pony.id).await? {
            return Err(KeeperError::NotFound);
        }

        tracing::info!(pony = %pony.name, "Pony removed");
        Ok(())
    }

    /// Newest-first transitions of a pony, at most `limit` (1-100).
    pub async fn list_history(
        &self,
        name: &str,
        passcode: &str,
        limit: u64,
    ) -> Result<Vec<HistoryModel>, KeeperError> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(KeeperError::validation(
                "limit",
                format!("must be between 1 and {MAX_HISTORY_LIMIT}"),
            ));
        }

        let pony = self.authenticate(name, passcode).await?;
        Ok(self.store.list_history(pony.id, limit).await?)
    }

    async fn authenticate(&self, name: &str, passcode: &str) -> Result<PonyModel, KeeperError> {
        self.store
            .get_by_name_and_secret_hash(name, &hash_passcode(passcode))
            .await?
            .ok_or(KeeperError::NotFound)
    }

    /// Log and count a persisted transition, then queue its notification.
    fn announce(&self, saved: PonyModel, transition: Transition) -> TransitionResult {
        counter!("keeper_transitions_total", "to" => transition.current.as_str()).increment(1);
        tracing::info!(
            pony = %saved.name,
            previous = %transition.previous,
            current = %transition.current,
            "Pony status changed"
        );

        let dispatcher = Arc::clone(&self.dispatcher);
        let snapshot = saved.clone();
        let notification = self.runner.run_async(async move {
            dispatcher
                .notify(&snapshot, transition.previous, transition.current)
                .await
        });

        TransitionResult {
            pony: saved,
            previous: transition.previous,
            current: transition.current,
            changed: true,
            notification: Some(notification),
        }
    }
}

fn history_record(pony: &PonyModel, transition: &Transition) -> HistoryModel {
    HistoryModel {
        id: Uuid::new_v4(),
        pony_id: pony.id,
        seq: 0,
        previous_status: transition.previous.as_str().to_string(),
        current_status: transition.current.as_str().to_string(),
        created_at: transition.at.fixed_offset(),
    }
}
