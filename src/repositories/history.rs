//! # History Repository
//!
//! Append and read operations for the histories table. Records are never updated
//! or deleted.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::history::{ActiveModel, Column, Entity as History, Model as HistoryModel};

pub struct HistoryRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> HistoryRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Insert `record` as the pony's newest entry. The `seq` on `record` is ignored and
    /// replaced by the next position for its pony.
    pub async fn append(&self, record: HistoryModel) -> Result<HistoryModel, RepositoryError> {
        let seq = self.last_seq(record.pony_id).await?.map_or(1, |last| last + 1);

        let active = ActiveModel {
            id: Set(record.id),
            pony_id: Set(record.pony_id),
            seq: Set(seq),
            previous_status: Set(record.previous_status),
            current_status: Set(record.current_status),
            created_at: Set(record.created_at),
        };

        active
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Most recent `limit` records for a pony, newest first.
    pub async fn list_for_pony(
        &self,
        pony_id: Uuid,
        limit: u64,
    ) -> Result<Vec<HistoryModel>, RepositoryError> {
        History::find()
            .filter(Column::PonyId.eq(pony_id))
            .order_by_desc(Column::Seq)
            .limit(limit)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    async fn last_seq(&self, pony_id: Uuid) -> Result<Option<i64>, RepositoryError> {
        let last = History::find()
            .select_only()
            .column_as(Column::Seq.max(), "last_seq")
            .filter(Column::PonyId.eq(pony_id))
            .into_tuple::<Option<i64>>()
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(last.flatten())
    }
}
