use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserSubscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserSubscriptions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserSubscriptions::AccountId).integer().not_null())
                    .col(ColumnDef::new(UserSubscriptions::PlanId).integer().not_null())
                    .col(
                        ColumnDef::new(UserSubscriptions::MerchantOrderId)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::Price)
                            .decimal_len(14, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::DiscountAmount)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(UserSubscriptions::DiscountType).string_len(16).null())
                    .col(
                        ColumnDef::new(UserSubscriptions::PayableAmount)
                            .decimal_len(14, 2)
                            .not_null(),
                    )
                    .col(ColumnDef::new(UserSubscriptions::CodeType).string_len(16).not_null())
                    .col(ColumnDef::new(UserSubscriptions::ReferralOrCoupon).string_len(32).null())
                    .col(ColumnDef::new(UserSubscriptions::ReferrerId).integer().null())
                    .col(
                        ColumnDef::new(UserSubscriptions::StartDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::EndDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(UserSubscriptions::Status).string_len(16).not_null())
                    .col(ColumnDef::new(UserSubscriptions::PaymentMethod).string().null())
                    .col(ColumnDef::new(UserSubscriptions::GatewayResponse).json().null())
                    .col(
                        ColumnDef::new(UserSubscriptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Activation and expiry both look up an account's rows by status
        manager
            .create_index(
                Index::create()
                    .name("idx_user_subscriptions_account_status")
                    .table(UserSubscriptions::Table)
                    .col(UserSubscriptions::AccountId)
                    .col(UserSubscriptions::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserSubscriptions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UserSubscriptions {
    Table,
    Id,
    AccountId,
    PlanId,
    MerchantOrderId,
    Price,
    DiscountAmount,
    DiscountType,
    PayableAmount,
    CodeType,
    ReferralOrCoupon,
    ReferrerId,
    StartDate,
    EndDate,
    Status,
    PaymentMethod,
    GatewayResponse,
    CreatedAt,
    UpdatedAt,
}
