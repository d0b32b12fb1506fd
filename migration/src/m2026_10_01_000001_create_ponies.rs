//! Migration to create the ponies table.
//!
//! Each row is one monitored pony: its identity, hashed passcode, silence tolerance,
//! liveness status and notification target.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Ponies::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Ponies::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Ponies::Name).string_len(50).not_null())
                    .col(ColumnDef::new(Ponies::PasscodeHash).string_len(64).not_null())
                    .col(ColumnDef::new(Ponies::DarkMinute).integer().not_null())
                    .col(
                        ColumnDef::new(Ponies::LastHiTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Ponies::Status)
                            .string_len(16)
                            .not_null()
                            .default("init"),
                    )
                    .col(ColumnDef::new(Ponies::NotifyChannel).string_len(16).not_null())
                    .col(ColumnDef::new(Ponies::NotifyUrl).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Ponies::CreatedAt)
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
                    .name("idx_ponies_name")
                    .table(Ponies::Table)
                    .col(Ponies::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // The sweep scans by status on every tick
        manager
            .create_index(
                Index::create()
                    .name("idx_ponies_status")
                    .table(Ponies::Table)
                    .col(Ponies::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_ponies_status").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_ponies_name").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Ponies::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Ponies {
    Table,
    Id,
    Name,
    PasscodeHash,
    DarkMinute,
    LastHiTime,
    Status,
    NotifyChannel,
    NotifyUrl,
    CreatedAt,
}
