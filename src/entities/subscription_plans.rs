//! SeaORM Entity for subscription_plans table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{DiscountType, PartyRole};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "subscription_plans")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    /// Party the plan is sold to
    pub role: PartyRole,
    pub price: Decimal,
    pub duration_days: i32,
    /// Points credited to both referrer and referee on a referral purchase
    pub referral_points: i32,
    pub referral_discount_type: Option<DiscountType>,
    pub referral_discount_value: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
