//! SeaORM Entity for user_subscriptions table
//!
//! One row per purchase attempt. `pending` until the payment completes, then
//! `active` or `in_queue`; `expired` once `end_date` has passed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{CodeType, DiscountType, SubscriptionStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "user_subscriptions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub account_id: i32,
    pub plan_id: i32,
    #[sea_orm(unique)]
    pub merchant_order_id: String,
    pub price: Decimal,
    pub discount_amount: Decimal,
    pub discount_type: Option<DiscountType>,
    pub payable_amount: Decimal,
    pub code_type: CodeType,
    /// Code exactly as entered by the buyer
    pub referral_or_coupon: Option<String>,
    /// Resolved referrer account for referral purchases
    pub referrer_id: Option<i32>,
    pub start_date: Option<DateTimeUtc>,
    pub end_date: Option<DateTimeUtc>,
    pub status: SubscriptionStatus,
    pub payment_method: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub gateway_response: Option<Json>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::subscription_plans::Entity",
        from = "Column::PlanId",
        to = "super::subscription_plans::Column::Id"
    )]
    SubscriptionPlans,
}

impl Related<super::subscription_plans::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SubscriptionPlans.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
