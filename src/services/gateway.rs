//! Payment gateway contract
//!
//! The reconciliation core talks to gateways only through [`PaymentGateway`].
//! Adapters own everything gateway specific: authentication, minor-unit
//! (paise) conversion, status vocabulary and webhook signatures. What comes
//! back is always normalized onto [`PaymentStatus`]; the raw state string is
//! carried alongside for audit and never branched on by the core.

use async_trait::async_trait;
use axum::http::HeaderMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::entities::{gateway_settings, prelude::*};
use crate::entities::sea_orm_active_enums::{GatewayKind, PaymentStatus};
use crate::error::PaymentResult;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway api error status={status} body={body}")]
    Api { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("gateway not configured: {0}")]
    NotConfigured(String),
}

/// Order the core asks a gateway to open. `amount` is in currency units.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub merchant_order_id: String,
    pub amount: Decimal,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub gateway_order_id: String,
    /// Whatever the client needs to finish paying (checkout URL or order token)
    pub token: Option<String>,
    pub raw_response: serde_json::Value,
}

/// Gateway view of a payment, already normalized
#[derive(Debug, Clone, Serialize)]
pub struct GatewayPaymentStatus {
    pub state: PaymentStatus,
    pub transaction_id: Option<String>,
    pub payment_method: Option<String>,
    pub raw_state: String,
    pub raw_response: serde_json::Value,
}

impl GatewayPaymentStatus {
    pub fn pending(raw_state: impl Into<String>, raw_response: serde_json::Value) -> Self {
        Self {
            state: PaymentStatus::Pending,
            transaction_id: None,
            payment_method: None,
            raw_state: raw_state.into(),
            raw_response,
        }
    }
}

/// Notification decoded from a verified webhook body
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub merchant_order_id: Option<String>,
    pub gateway_order_id: Option<String>,
    pub status: GatewayPaymentStatus,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError>;

    /// Latest state of an order. Adapters that key status lookups on their
    /// own order id receive it through `gateway_order_id`.
    async fn fetch_status(
        &self,
        merchant_order_id: &str,
        gateway_order_id: Option<&str>,
    ) -> Result<GatewayPaymentStatus, GatewayError>;

    fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> bool;

    /// Decode a verified webhook body. `Ok(None)` means the event carries no
    /// payment state and can be acknowledged without action.
    fn parse_webhook(&self, body: &[u8]) -> Result<Option<WebhookEvent>, GatewayError>;
}

/// Adapters available to this process, keyed by gateway
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<GatewayKind, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.register(gateway);
        self
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.kind(), gateway);
    }

    pub fn get(&self, kind: GatewayKind) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        self.gateways
            .get(&kind)
            .cloned()
            .ok_or_else(|| GatewayError::NotConfigured(format!("{:?} adapter is not registered", kind)))
    }

    pub fn kinds(&self) -> Vec<GatewayKind> {
        self.gateways.keys().copied().collect()
    }
}

/// The gateway setting row in force for one operation.
///
/// Resolved once at the start of an operation and passed along, so every
/// ledger row written by that operation references the same setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveGateway {
    pub setting_id: i32,
    pub kind: GatewayKind,
}

pub async fn resolve_active_gateway<C: ConnectionTrait>(conn: &C) -> PaymentResult<ActiveGateway> {
    let setting = GatewaySettings::find()
        .filter(gateway_settings::Column::IsActive.eq(true))
        .order_by_desc(gateway_settings::Column::UpdatedAt)
        .one(conn)
        .await?
        .ok_or_else(|| GatewayError::NotConfigured("no active payment gateway".to_string()))?;

    Ok(ActiveGateway {
        setting_id: setting.id,
        kind: setting.gateway,
    })
}

/// Currency units to paise. Gateways reject fractional paise, so anything
/// beyond two decimal places is an error rather than silently rounded.
pub fn to_minor_units(amount: Decimal) -> Result<i64, GatewayError> {
    let scaled = amount * Decimal::ONE_HUNDRED;
    if scaled.fract() != Decimal::ZERO {
        return Err(GatewayError::InvalidResponse(format!(
            "amount {} has sub-paise precision",
            amount
        )));
    }
    scaled
        .to_i64()
        .ok_or_else(|| GatewayError::InvalidResponse(format!("amount {} out of range", amount)))
}
