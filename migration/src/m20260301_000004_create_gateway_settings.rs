//! Gateway setting records. Exactly one row is expected to be active; ledger
//! rows keep a reference to the row that was active when they were opened.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GatewaySettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GatewaySettings::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(GatewaySettings::Gateway).string_len(16).not_null())
                    .col(
                        ColumnDef::new(GatewaySettings::IsActive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(GatewaySettings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(GatewaySettings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GatewaySettings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GatewaySettings {
    Table,
    Id,
    Gateway,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
