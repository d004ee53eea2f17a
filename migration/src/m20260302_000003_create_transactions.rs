//! Double-entry ledger legs.
//!
//! `(merchant_order_id, transaction_type)` is unique: every payment attempt has
//! exactly one debited and one credited leg.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::CustomerId).integer().null())
                    .col(ColumnDef::new(Transactions::PartnerId).integer().null())
                    .col(ColumnDef::new(Transactions::AdminId).integer().null())
                    .col(ColumnDef::new(Transactions::PaymentFor).string_len(16).not_null())
                    .col(ColumnDef::new(Transactions::UserSubscriptionId).integer().null())
                    .col(ColumnDef::new(Transactions::WalletId).integer().null())
                    .col(ColumnDef::new(Transactions::PaymentGateway).string_len(16).not_null())
                    .col(ColumnDef::new(Transactions::GatewayId).integer().not_null())
                    .col(
                        ColumnDef::new(Transactions::MerchantOrderId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::GatewayOrderId).string().null())
                    .col(ColumnDef::new(Transactions::TransactionId).string().null())
                    .col(ColumnDef::new(Transactions::PaymentMethod).string().null())
                    .col(ColumnDef::new(Transactions::PaymentStatus).string_len(16).not_null())
                    .col(ColumnDef::new(Transactions::GatewayState).string().null())
                    .col(ColumnDef::new(Transactions::TransactionType).string_len(16).not_null())
                    .col(ColumnDef::new(Transactions::Amount).decimal_len(14, 2).not_null())
                    .col(ColumnDef::new(Transactions::Particular).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Transactions::UpdatedAt)
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
                    .name("idx_transactions_merchant_order_leg")
                    .table(Transactions::Table)
                    .col(Transactions::MerchantOrderId)
                    .col(Transactions::TransactionType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Pending payment poller
        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_status_created_at")
                    .table(Transactions::Table)
                    .col(Transactions::PaymentStatus)
                    .col(Transactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Id,
    CustomerId,
    PartnerId,
    AdminId,
    PaymentFor,
    UserSubscriptionId,
    WalletId,
    PaymentGateway,
    GatewayId,
    MerchantOrderId,
    GatewayOrderId,
    TransactionId,
    PaymentMethod,
    PaymentStatus,
    GatewayState,
    TransactionType,
    Amount,
    Particular,
    CreatedAt,
    UpdatedAt,
}
