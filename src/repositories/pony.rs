//! # Pony Repository
//!
//! SeaORM operations for the ponies table. Generic over the connection so the same
//! queries run on the pool or inside a transaction.

use sea_orm::ActiveValue::Unchanged;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::PonyStatus;
use crate::models::pony::{
    ActiveModel, Column, Entity as Pony, Model as PonyModel, UnknownStatus,
};

/// Liveness columns a conditional write expects to still find in the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessGuard {
    pub status: PonyStatus,
    pub last_hi_time: Option<DateTimeWithTimeZone>,
}

impl LivenessGuard {
    /// The liveness state of `pony` as it was read.
    pub fn of(pony: &PonyModel) -> Result<Self, UnknownStatus> {
        Ok(Self {
            status: pony.liveness()?,
            last_hi_time: pony.last_hi_time,
        })
    }
}

/// Repository for pony database operations
pub struct PonyRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> PonyRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<PonyModel>, RepositoryError> {
        Pony::find()
            .filter(Column::Name.eq(name))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Ponies in `status`, oldest first.
    pub async fn find_by_status(
        &self,
        status: PonyStatus,
    ) -> Result<Vec<PonyModel>, RepositoryError> {
        Pony::find()
            .filter(Column::Status.eq(status.as_str()))
            .order_by_asc(Column::CreatedAt)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn insert(&self, pony: PonyModel) -> Result<PonyModel, RepositoryError> {
        let active = ActiveModel {
            id: Set(pony.id),
            name: Set(pony.name),
            passcode_hash: Set(pony.passcode_hash),
            dark_minute: Set(pony.dark_minute),
            last_hi_time: Set(pony.last_hi_time),
            status: Set(pony.status),
            notify_channel: Set(pony.notify_channel),
            notify_url: Set(pony.notify_url),
            created_at: Set(pony.created_at),
        };

        active
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PonyModel>, RepositoryError> {
        Pony::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Persist the settings columns of `pony`: passcode hash, tolerance and
    /// notification target. Status and heartbeat time are left alone.
    pub async fn update_settings(&self, pony: &PonyModel) -> Result<PonyModel, RepositoryError> {
        let active = ActiveModel {
            id: Unchanged(pony.id),
            passcode_hash: Set(pony.passcode_hash.clone()),
            dark_minute: Set(pony.dark_minute),
            notify_channel: Set(pony.notify_channel.clone()),
            notify_url: Set(pony.notify_url.clone()),
            ..Default::default()
        };

        match active.update(self.db).await {
            Ok(updated) => Ok(updated),
            Err(DbErr::RecordNotUpdated) => Err(RepositoryError::NotFound(format!(
                "pony {}",
                pony.id
            ))),
            Err(err) => Err(RepositoryError::database_error(err)),
        }
    }

    /// Write `status` and `last_hi_time` from `pony`, but only while the row still holds
    /// the values in `expected`. Returns whether the row was updated.
    pub async fn update_liveness(
        &self,
        pony: &PonyModel,
        expected: &LivenessGuard,
    ) -> Result<bool, RepositoryError> {
        let query = Pony::update_many()
            .col_expr(Column::Status, Expr::value(pony.status.clone()))
            .col_expr(Column::LastHiTime, Expr::value(pony.last_hi_time))
            .filter(Column::Id.eq(pony.id))
            .filter(Column::Status.eq(expected.status.as_str()));

        let query = match expected.last_hi_time {
            Some(at) => query.filter(Column::LastHiTime.eq(at)),
            None => query.filter(Column::LastHiTime.is_null()),
        };

        let result = query
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(result.rows_affected > 0)
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = Pony::delete_by_id(id)
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(result.rows_affected > 0)
    }
}
