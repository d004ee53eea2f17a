//! Razorpay Orders adapter
//!
//! Orders are created with our merchant order id as `receipt` (and in
//! `notes`), so webhooks can be traced back without a lookup. Status polling
//! is keyed on Razorpay's `order_...` id, which the ledger stores as
//! `gateway_order_id`.

use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::config::RazorpayConfig;
use crate::entities::sea_orm_active_enums::{GatewayKind, PaymentStatus};
use crate::services::gateway::{
    to_minor_units, GatewayError, GatewayOrder, GatewayPaymentStatus, OrderRequest,
    PaymentGateway, WebhookEvent,
};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-razorpay-signature";
const CURRENCY: &str = "INR";

#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    config: RazorpayConfig,
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'static str,
    receipt: &'a str,
    notes: OrderNotes<'a>,
}

#[derive(Debug, Serialize)]
struct OrderNotes<'a> {
    merchant_order_id: &'a str,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PaymentCollection {
    #[serde(default)]
    items: Vec<PaymentEntity>,
}

#[derive(Debug, Clone, Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: Option<String>,
    status: String,
    method: Option<String>,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    notes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    event: String,
    payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: Option<EntityWrapper<PaymentEntity>>,
    order: Option<EntityWrapper<WebhookOrder>>,
}

#[derive(Debug, Deserialize)]
struct EntityWrapper<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct WebhookOrder {
    id: String,
    receipt: Option<String>,
}

/// `captured` is the only success state; `failed` is terminal; everything
/// else (`created`, `authorized`, ...) is still in flight.
pub fn normalize_state(state: &str) -> PaymentStatus {
    match state {
        "captured" => PaymentStatus::Completed,
        "failed" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

/// Hex HMAC-SHA256 of `payload` under `secret`
pub fn sign(secret: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Fold every attempt on an order into one state: a captured payment wins,
/// otherwise the most recent attempt decides.
fn summarize_payments(
    mut payments: Vec<PaymentEntity>,
    raw_response: serde_json::Value,
) -> GatewayPaymentStatus {
    payments.sort_by_key(|p| p.created_at);

    let decisive = payments
        .iter()
        .rev()
        .find(|p| p.status == "captured")
        .or_else(|| payments.last());

    match decisive {
        Some(payment) => GatewayPaymentStatus {
            state: normalize_state(&payment.status),
            transaction_id: Some(payment.id.clone()),
            payment_method: payment.method.clone(),
            raw_state: payment.status.clone(),
            raw_response,
        },
        None => GatewayPaymentStatus::pending("created", raw_response),
    }
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, GatewayError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| GatewayError::InvalidResponse(format!("{}; body={}", e, body)))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Razorpay
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError> {
        let amount = to_minor_units(request.amount)?;

        info!(
            merchant_order_id = %request.merchant_order_id,
            amount_paise = amount,
            "Creating Razorpay order"
        );

        let body = CreateOrderRequest {
            amount,
            currency: CURRENCY,
            receipt: &request.merchant_order_id,
            notes: OrderNotes {
                merchant_order_id: &request.merchant_order_id,
                description: &request.description,
            },
        };

        let response = self
            .client
            .post(format!("{}/v1/orders", self.config.base_url))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body)
            .send()
            .await?;

        let raw = Self::read_json(response).await?;
        let order: OrderResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::InvalidResponse(format!("order response: {}", e)))?;

        Ok(GatewayOrder {
            token: Some(order.id.clone()),
            gateway_order_id: order.id,
            raw_response: raw,
        })
    }

    async fn fetch_status(
        &self,
        merchant_order_id: &str,
        gateway_order_id: Option<&str>,
    ) -> Result<GatewayPaymentStatus, GatewayError> {
        let order_id = gateway_order_id.ok_or_else(|| {
            GatewayError::InvalidResponse(format!(
                "no Razorpay order id recorded for {}",
                merchant_order_id
            ))
        })?;

        let response = self
            .client
            .get(format!("{}/v1/orders/{}/payments", self.config.base_url, order_id))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await?;

        let raw = Self::read_json(response).await?;
        let collection: PaymentCollection = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::InvalidResponse(format!("payments response: {}", e)))?;

        debug!(
            merchant_order_id = %merchant_order_id,
            order_id = %order_id,
            attempts = collection.items.len(),
            "Razorpay order payments"
        );

        Ok(summarize_payments(collection.items, raw))
    }

    fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> bool {
        let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
            warn!("Razorpay webhook without signature header");
            return false;
        };

        verify_signature(&self.config.webhook_secret, body, signature)
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<Option<WebhookEvent>, GatewayError> {
        let raw: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidResponse(format!("webhook body: {}", e)))?;
        let parsed: WebhookBody = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::InvalidResponse(format!("webhook body: {}", e)))?;

        let Some(payment) = parsed.payload.payment.map(|p| p.entity) else {
            debug!(event = %parsed.event, "Ignoring Razorpay webhook without payment entity");
            return Ok(None);
        };

        let merchant_order_id = payment
            .notes
            .get("merchant_order_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| {
                parsed
                    .payload
                    .order
                    .as_ref()
                    .and_then(|o| o.entity.receipt.clone())
            });

        let gateway_order_id = payment
            .order_id
            .clone()
            .or_else(|| parsed.payload.order.as_ref().map(|o| o.entity.id.clone()));

        let status = GatewayPaymentStatus {
            state: normalize_state(&payment.status),
            transaction_id: Some(payment.id),
            payment_method: payment.method,
            raw_state: payment.status,
            raw_response: raw,
        };

        Ok(Some(WebhookEvent {
            merchant_order_id,
            gateway_order_id,
            status,
        }))
    }
}
