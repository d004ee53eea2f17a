//! `SeaORM` Entity prelude

pub use super::accounts::Entity as Accounts;
pub use super::coupons::Entity as Coupons;
pub use super::gateway_settings::Entity as GatewaySettings;
pub use super::referral_history::Entity as ReferralHistory;
pub use super::subscription_plans::Entity as SubscriptionPlans;
pub use super::transactions::Entity as Transactions;
pub use super::user_subscriptions::Entity as UserSubscriptions;
pub use super::wallets::Entity as Wallets;
