//! SeaORM Entity for referral_history table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "referral_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Account whose history this entry belongs to
    pub account_id: i32,
    /// The other side of the referral
    pub related_account_id: i32,
    pub user_subscription_id: i32,
    pub points: i32,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
