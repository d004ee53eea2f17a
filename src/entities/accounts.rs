//! SeaORM Entity for accounts (customer and partner profiles)
//!
//! Besides identity, an account carries three cached projections that other
//! parts of the marketplace read without touching the ledger:
//! `wallet_balance`, `referral_points` and the entitlement snapshot.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::PartyRole;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub role: PartyRole,
    pub name: String,
    /// Code other accounts enter to be referred by this one
    #[sea_orm(unique)]
    pub referral_code: String,
    /// Sum of this account's `referral_history` points
    pub referral_points: i32,
    /// Completed top-ups minus completed deductions
    pub wallet_balance: Decimal,
    pub is_subscription_plan_active: bool,
    /// `user_subscriptions.id` of the currently active plan
    pub active_subscription_plan_id: Option<i32>,
    pub subscription_expires_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
