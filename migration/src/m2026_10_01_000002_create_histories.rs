//! Migration to create the histories table.
//!
//! Histories are an append-only audit trail of pony status changes. `pony_id` is a plain
//! reference without a foreign key so rows survive the removal of their pony.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Histories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Histories::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Histories::PonyId).uuid().not_null())
                    .col(ColumnDef::new(Histories::Seq).big_integer().not_null())
                    .col(
                        ColumnDef::new(Histories::PreviousStatus)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Histories::CurrentStatus)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Histories::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_histories_pony_id_seq")
                    .table(Histories::Table)
                    .col(Histories::PonyId)
                    .col(Histories::Seq)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_histories_pony_id_seq")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Histories::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Histories {
    Table,
    Id,
    PonyId,
    Seq,
    PreviousStatus,
    CurrentStatus,
    CreatedAt,
}
