//! SeaORM Entity for transactions table (ledger legs)
//!
//! Every payment attempt owns exactly two rows sharing `merchant_order_id`:
//! a `debited` leg for the paying customer/partner and a `credited` leg for
//! the platform admin. Both legs always carry the same amount and status.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{GatewayKind, PaymentFor, PaymentStatus, TransactionType};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub customer_id: Option<i32>,
    pub partner_id: Option<i32>,
    pub admin_id: Option<i32>,
    pub payment_for: PaymentFor,
    pub user_subscription_id: Option<i32>,
    pub wallet_id: Option<i32>,
    pub payment_gateway: GatewayKind,
    /// `gateway_settings.id` that was active when the payment was opened
    pub gateway_id: i32,
    pub merchant_order_id: String,
    /// Gateway-side order reference (Razorpay `order_...`, PhonePe order id)
    pub gateway_order_id: Option<String>,
    /// Gateway payment id, set once the payment completes
    pub transaction_id: Option<String>,
    pub payment_method: Option<String>,
    pub payment_status: PaymentStatus,
    /// Raw gateway state string, audit only
    pub gateway_state: Option<String>,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub particular: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
