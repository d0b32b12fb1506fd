//! # Repository Layer
//!
//! [`PonyStore`] is the durable store the core talks to. [`SeaOrmPonyStore`] backs it
//! with the SeaORM repositories in this module; tests can substitute their own
//! implementation to inject failures.

pub mod history;
pub mod pony;

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, TransactionTrait};
use uuid::Uuid;

use crate::crypto;
use crate::error::RepositoryError;
use crate::models::PonyStatus;
use crate::models::history::Model as HistoryModel;
use crate::models::pony::Model as PonyModel;

pub use history::HistoryRepository;
pub use pony::{LivenessGuard, PonyRepository};

/// Durable store of ponies and their transition history.
#[async_trait]
pub trait PonyStore: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Option<PonyModel>, RepositoryError>;

    /// Look up a pony by name and passcode hash. A wrong hash is indistinguishable from
    /// an unknown name.
    async fn get_by_name_and_secret_hash(
        &self,
        name: &str,
        passcode_hash: &str,
    ) -> Result<Option<PonyModel>, RepositoryError> {
        Ok(self
            .get_by_name(name)
            .await?
            .filter(|pony| crypto::hashes_match(&pony.passcode_hash, passcode_hash)))
    }

    async fn insert(&self, pony: PonyModel) -> Result<PonyModel, RepositoryError>;

    /// Persist the settings columns (passcode hash, tolerance, notification target).
    async fn save_settings(&self, pony: &PonyModel) -> Result<PonyModel, RepositoryError>;

    /// Returns whether the pony existed.
    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError>;

    async fn list_by_status(&self, status: PonyStatus) -> Result<Vec<PonyModel>, RepositoryError>;

    async fn append_history(&self, record: HistoryModel) -> Result<HistoryModel, RepositoryError>;

    /// Newest first.
    async fn list_history(
        &self,
        pony_id: Uuid,
        limit: u64,
    ) -> Result<Vec<HistoryModel>, RepositoryError>;

    /// Write the liveness columns of `pony`, and `record` if given, as one unit. Nothing
    /// is written unless the stored row still matches `expected`; `Ok(None)` reports
    /// that the row changed underneath the caller.
    async fn save_liveness(
        &self,
        pony: &PonyModel,
        expected: &LivenessGuard,
        record: Option<HistoryModel>,
    ) -> Result<Option<PonyModel>, RepositoryError>;
}

/// [`PonyStore`] over a SeaORM connection pool.
#[derive(Clone)]
pub struct SeaOrmPonyStore {
    db: DatabaseConnection,
}

impl SeaOrmPonyStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PonyStore for SeaOrmPonyStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<PonyModel>, RepositoryError> {
        PonyRepository::new(&self.db).find_by_name(name).await
    }

    async fn insert(&self, pony: PonyModel) -> Result<PonyModel, RepositoryError> {
        PonyRepository::new(&self.db).insert(pony).await
    }

    async fn save_settings(&self, pony: &PonyModel) -> Result<PonyModel, RepositoryError> {
        PonyRepository::new(&self.db).update_settings(pony).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        PonyRepository::new(&self.db).delete(id).await
    }

    async fn list_by_status(&self, status: PonyStatus) -> Result<Vec<PonyModel>, RepositoryError> {
        PonyRepository::new(&self.db).find_by_status(status).await
    }

    async fn append_history(&self, record: HistoryModel) -> Result<HistoryModel, RepositoryError> {
        HistoryRepository::new(&self.db).append(record).await
    }

    async fn list_history(
        &self,
        pony_id: Uuid,
        limit: u64,
    ) -> Result<Vec<HistoryModel>, RepositoryError> {
        HistoryRepository::new(&self.db)
            .list_for_pony(pony_id, limit)
            .await
    }

    async fn save_liveness(
        &self,
        pony: &PonyModel,
        expected: &LivenessGuard,
        record: Option<HistoryModel>,
    ) -> Result<Option<PonyModel>, RepositoryError> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(RepositoryError::database_error)?;
        let ponies = PonyRepository::new(&txn);

        if !ponies.update_liveness(pony, expected).await? {
            txn.rollback()
                .await
                .map_err(RepositoryError::database_error)?;
            return Ok(None);
        }

        if let Some(record) = record {
            HistoryRepository::new(&txn).append(record).await?;
        }

        let saved = ponies
            .find_by_id(pony.id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("pony {}", pony.id)))?;

        txn.commit().await.map_err(RepositoryError::database_error)?;

        Ok(Some(saved))
    }
}
