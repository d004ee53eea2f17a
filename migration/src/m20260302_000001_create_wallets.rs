use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Wallets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Wallets::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Wallets::AccountId).integer().not_null())
                    .col(ColumnDef::new(Wallets::PaymentMethod).string().null())
                    .col(ColumnDef::new(Wallets::PaymentStatus).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Wallets::MerchantOrderId)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Wallets::InvoiceNo).string_len(64).not_null())
                    .col(ColumnDef::new(Wallets::Amount).decimal_len(14, 2).not_null())
                    .col(ColumnDef::new(Wallets::WalletType).string_len(16).not_null())
                    .col(ColumnDef::new(Wallets::GatewayResponse).json().null())
                    .col(
                        ColumnDef::new(Wallets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Wallets::UpdatedAt)
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
                    .name("idx_wallets_account_id")
                    .table(Wallets::Table)
                    .col(Wallets::AccountId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Wallets::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Wallets {
    Table,
    Id,
    AccountId,
    PaymentMethod,
    PaymentStatus,
    MerchantOrderId,
    InvoiceNo,
    Amount,
    WalletType,
    GatewayResponse,
    CreatedAt,
    UpdatedAt,
}
