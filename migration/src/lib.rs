pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_accounts;
mod m20260301_000002_create_subscription_plans;
mod m20260301_000003_create_coupons;
mod m20260301_000004_create_gateway_settings;
mod m20260302_000001_create_wallets;
mod m20260302_000002_create_user_subscriptions;
mod m20260302_000003_create_transactions;
mod m20260302_000004_create_referral_history;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_accounts::Migration),
            Box::new(m20260301_000002_create_subscription_plans::Migration),
            Box::new(m20260301_000003_create_coupons::Migration),
            Box::new(m20260301_000004_create_gateway_settings::Migration),
            Box::new(m20260302_000001_create_wallets::Migration),
            Box::new(m20260302_000002_create_user_subscriptions::Migration),
            Box::new(m20260302_000003_create_transactions::Migration),
            Box::new(m20260302_000004_create_referral_history::Migration),
        ]
    }
}
