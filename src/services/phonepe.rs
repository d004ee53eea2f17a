//! PhonePe Standard Checkout (v2) adapter
//!
//! Auth is an OAuth client-credentials token sent as `O-Bearer`. Tokens are
//! cached until shortly before PhonePe expires them. Orders are keyed on our
//! merchant order id, so status lookups never need PhonePe's own order id.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use moka::future::Cache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::PhonePeConfig;
use crate::entities::sea_orm_active_enums::{GatewayKind, PaymentStatus};
use crate::services::gateway::{
    to_minor_units, GatewayError, GatewayOrder, GatewayPaymentStatus, OrderRequest,
    PaymentGateway, WebhookEvent,
};

/// Seconds after which PhonePe expires an unpaid checkout
const ORDER_EXPIRE_AFTER_SECS: u64 = 1200;

/// Refresh tokens this long before PhonePe's own expiry
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Lifetime of a cached token
const DEFAULT_TOKEN_TTL_SECS: u64 = 900;

const TOKEN_CACHE_KEY: &str = "phonepe_access_token";

#[derive(Clone)]
pub struct PhonePeGateway {
    client: Client,
    config: PhonePeConfig,
    token_cache: Arc<Cache<String, String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Epoch seconds
    expires_at: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PayRequest<'a> {
    merchant_order_id: &'a str,
    amount: i64,
    expire_after: u64,
    payment_flow: PaymentFlow<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentFlow<'a> {
    #[serde(rename = "type")]
    flow_type: &'static str,
    message: &'a str,
    merchant_urls: MerchantUrls<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MerchantUrls<'a> {
    redirect_url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayResponse {
    order_id: String,
    redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusResponse {
    order_id: Option<String>,
    state: String,
    #[serde(default)]
    payment_details: Vec<PaymentDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentDetail {
    payment_mode: Option<String>,
    transaction_id: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    event: String,
    payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    order_id: Option<String>,
    merchant_order_id: Option<String>,
    state: String,
    #[serde(default)]
    payment_details: Vec<PaymentDetail>,
}

/// PhonePe reports `COMPLETED`, `FAILED` or `PENDING`; anything unexpected is
/// treated as still pending.
pub fn normalize_state(state: &str) -> PaymentStatus {
    match state.to_ascii_uppercase().as_str() {
        "COMPLETED" => PaymentStatus::Completed,
        "FAILED" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

/// Hex SHA-256 of `username:password`, which PhonePe sends in the
/// `Authorization` header of every callback.
pub fn webhook_authorization(username: &str, password: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", username, password).as_bytes());
    hex::encode(digest)
}

fn status_from_details(
    state: &str,
    details: &[PaymentDetail],
    raw_response: serde_json::Value,
) -> GatewayPaymentStatus {
    let normalized = normalize_state(state);

    // The last attempt is the one that decided the order state
    let attempt = details
        .iter()
        .rev()
        .find(|d| d.state.as_deref().map(normalize_state) == Some(normalized))
        .or_else(|| details.last());

    GatewayPaymentStatus {
        state: normalized,
        transaction_id: attempt.and_then(|d| d.transaction_id.clone()),
        payment_method: attempt
            .and_then(|d| d.payment_mode.as_ref())
            .map(|m| m.to_ascii_lowercase()),
        raw_state: state.to_string(),
        raw_response,
    }
}

impl PhonePeGateway {
    pub fn new(config: PhonePeConfig) -> Self {
        let token_cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(DEFAULT_TOKEN_TTL_SECS))
            .build();

        Self {
            client: Client::new(),
            config,
            token_cache: Arc::new(token_cache),
        }
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        if let Some(token) = self.token_cache.get(TOKEN_CACHE_KEY).await {
            return Ok(token);
        }

        debug!("Fetching PhonePe access token");

        let response = self
            .client
            .post(format!("{}/v1/oauth/token", self.config.auth_url))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_version", self.config.client_version.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::InvalidResponse(format!("token response: {}", e)))?;

        let remaining = token
            .expires_at
            .map(|exp| exp - Utc::now().timestamp() - TOKEN_EXPIRY_MARGIN_SECS)
            .unwrap_or(0);

        // Cache entries live for DEFAULT_TOKEN_TTL_SECS, so the token must outlive that
        if remaining > DEFAULT_TOKEN_TTL_SECS as i64 {
            self.token_cache
                .insert(TOKEN_CACHE_KEY.to_string(), token.access_token.clone())
                .await;
        }

        Ok(token.access_token)
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
impl PaymentGateway for PhonePeGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::PhonePe
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError> {
        let token = self.access_token().await?;
        let amount = to_minor_units(request.amount)?;

        info!(
            merchant_order_id = %request.merchant_order_id,
            amount_paise = amount,
            "Creating PhonePe checkout order"
        );

        let body = PayRequest {
            merchant_order_id: &request.merchant_order_id,
            amount,
            expire_after: ORDER_EXPIRE_AFTER_SECS,
            payment_flow: PaymentFlow {
                flow_type: "PG_CHECKOUT",
                message: &request.description,
                merchant_urls: MerchantUrls {
                    redirect_url: &self.config.redirect_url,
                },
            },
        };

        let response = self
            .client
            .post(format!("{}/checkout/v2/pay", self.config.base_url))
            .header("Authorization", format!("O-Bearer {}", token))
            .json(&body)
            .send()
            .await?;

        let raw = Self::read_json(response).await?;
        let parsed: PayResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::InvalidResponse(format!("pay response: {}", e)))?;

        Ok(GatewayOrder {
            gateway_order_id: parsed.order_id,
            token: parsed.redirect_url,
            raw_response: raw,
        })
    }

    async fn fetch_status(
        &self,
        merchant_order_id: &str,
        _gateway_order_id: Option<&str>,
    ) -> Result<GatewayPaymentStatus, GatewayError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .get(format!(
                "{}/checkout/v2/order/{}/status",
                self.config.base_url, merchant_order_id
            ))
            .header("Authorization", format!("O-Bearer {}", token))
            .query(&[("details", "false")])
            .send()
            .await?;

        let raw = Self::read_json(response).await?;
        let parsed: OrderStatusResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::InvalidResponse(format!("status response: {}", e)))?;

        debug!(
            merchant_order_id = %merchant_order_id,
            order_id = ?parsed.order_id,
            state = %parsed.state,
            "PhonePe order status"
        );

        Ok(status_from_details(&parsed.state, &parsed.payment_details, raw))
    }

    fn verify_webhook(&self, headers: &HeaderMap, _body: &[u8]) -> bool {
        let Some(received) = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        else {
            warn!("PhonePe webhook without Authorization header");
            return false;
        };

        let expected =
            webhook_authorization(&self.config.webhook_username, &self.config.webhook_password);
        received.trim().eq_ignore_ascii_case(&expected)
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<Option<WebhookEvent>, GatewayError> {
        let raw: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidResponse(format!("webhook body: {}", e)))?;
        let parsed: WebhookBody = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::InvalidResponse(format!("webhook body: {}", e)))?;

        if !parsed.event.starts_with("checkout.order.") {
            debug!(event = %parsed.event, "Ignoring PhonePe webhook event");
            return Ok(None);
        }

        let status =
            status_from_details(&parsed.payload.state, &parsed.payload.payment_details, raw);

        Ok(Some(WebhookEvent {
            merchant_order_id: parsed.payload.merchant_order_id,
            gateway_order_id: parsed.payload.order_id,
            status,
        }))
    }
}
