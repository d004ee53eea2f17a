use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::sea_orm_active_enums::{GatewayKind, PaymentFor, PaymentStatus};
use crate::services::payment_intent::PaymentIntent;
use crate::services::reconciliation::{BusinessSnapshot, ReconcileOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseSubscriptionRequest {
    pub account_id: i32,
    pub plan_id: i32,
    /// Referral code of another account, or a coupon code
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTopUpRequest {
    pub account_id: i32,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub merchant_order_id: String,
    pub amount: Decimal,
    pub gateway: GatewayKind,
    pub gateway_order_id: String,
    pub gateway_token: Option<String>,
}

impl From<PaymentIntent> for PaymentIntentResponse {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            merchant_order_id: intent.merchant_order_id,
            amount: intent.amount,
            gateway: intent.gateway,
            gateway_order_id: intent.gateway_order_id,
            gateway_token: intent.gateway_token,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub merchant_order_id: String,
    pub payment_for: PaymentFor,
    pub status: PaymentStatus,
    pub applied: bool,
    pub record: BusinessSnapshot,
}

impl From<ReconcileOutcome> for PaymentStatusResponse {
    fn from(outcome: ReconcileOutcome) -> Self {
        Self {
            merchant_order_id: outcome.merchant_order_id,
            payment_for: outcome.descriptor.object_kind,
            status: outcome.final_status,
            applied: outcome.applied,
            record: outcome.snapshot,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAckResponse {
    pub received: bool,
    pub merchant_order_id: Option<String>,
    pub status: Option<PaymentStatus>,
    pub applied: bool,
}
