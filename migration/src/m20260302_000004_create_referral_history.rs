use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReferralHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReferralHistory::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReferralHistory::AccountId).integer().not_null())
                    .col(
                        ColumnDef::new(ReferralHistory::RelatedAccountId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReferralHistory::UserSubscriptionId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReferralHistory::Points).integer().not_null())
                    .col(
                        ColumnDef::new(ReferralHistory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One credit per account per paid subscription
        manager
            .create_index(
                Index::create()
                    .name("idx_referral_history_account_subscription")
                    .table(ReferralHistory::Table)
                    .col(ReferralHistory::AccountId)
                    .col(ReferralHistory::UserSubscriptionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReferralHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ReferralHistory {
    Table,
    Id,
    AccountId,
    RelatedAccountId,
    UserSubscriptionId,
    Points,
    CreatedAt,
}
