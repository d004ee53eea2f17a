//! SeaORM Entity for wallets table
//!
//! One row per cash-movement intent (top-up or deduction). Created PENDING
//! when the gateway order is opened and moved to a terminal status by
//! reconciliation.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{PaymentStatus, WalletType};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "wallets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub account_id: i32,
    pub payment_method: Option<String>,
    pub payment_status: PaymentStatus,
    #[sea_orm(unique)]
    pub merchant_order_id: String,
    pub invoice_no: String,
    pub amount: Decimal,
    pub wallet_type: WalletType,
    /// Raw gateway payload, kept for audit only
    #[sea_orm(column_type = "Json", nullable)]
    pub gateway_response: Option<Json>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
