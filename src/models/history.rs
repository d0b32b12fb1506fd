//! History entity model
//!
//! Append-only audit record of one pony status change.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "histories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Pony the transition belongs to. Not a foreign key: rows outlive their pony.
    pub pony_id: Uuid,

    /// Per-pony position, assigned on append; orders records written at the same instant.
    pub seq: i64,

    pub previous_status: String,

    pub current_status: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
