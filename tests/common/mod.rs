#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use marketplace_backend::config::PaymentSettings;
use marketplace_backend::entities::sea_orm_active_enums::{
    CodeType, DiscountType, GatewayKind, PartyRole, PaymentStatus, SubscriptionStatus,
};
use marketplace_backend::entities::{
    accounts, coupons, gateway_settings, subscription_plans, user_subscriptions,
};
use marketplace_backend::services::gateway::{
    GatewayError, GatewayOrder, GatewayPaymentStatus, GatewayRegistry, OrderRequest,
    PaymentGateway, WebhookEvent,
};
use marketplace_backend::services::payments::PaymentService;
use migration::{Migrator, MigratorTrait};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use serde::Deserialize;

pub const ADMIN_ID: i32 = 1;
pub const MOCK_SIGNATURE_HEADER: &str = "x-mock-signature";
pub const MOCK_SIGNATURE: &str = "valid";

/// Fresh in-memory SQLite database with all migrations applied.
///
/// A single pooled connection keeps every query on the same in-memory
/// database.
pub async fn setup_test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("Failed to open in-memory database");
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    db
}

/// Scripted gateway: statuses are set per merchant order id by the test
pub struct MockGateway {
    kind: GatewayKind,
    statuses: Mutex<HashMap<String, GatewayPaymentStatus>>,
    fail_create: AtomicBool,
    orders_created: AtomicUsize,
    status_calls: AtomicUsize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MockWebhook {
    merchant_order_id: Option<String>,
    gateway_order_id: Option<String>,
    state: String,
    transaction_id: Option<String>,
    payment_method: Option<String>,
}

fn normalize(state: &str) -> PaymentStatus {
    match state {
        "COMPLETED" => PaymentStatus::Completed,
        "FAILED" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

impl MockGateway {
    pub fn new(kind: GatewayKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            statuses: Mutex::new(HashMap::new()),
            fail_create: AtomicBool::new(false),
            orders_created: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_status(&self, merchant_order_id: &str, state: &str, method: Option<&str>) {
        let status = GatewayPaymentStatus {
            state: normalize(state),
            transaction_id: Some(format!("TXN-{}", merchant_order_id)),
            payment_method: method.map(str::to_string),
            raw_state: state.to_string(),
            raw_response: serde_json::json!({ "state": state }),
        };
        self.statuses
            .lock()
            .unwrap()
            .insert(merchant_order_id.to_string(), status);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn orders_created(&self) -> usize {
        self.orders_created.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn kind(&self) -> GatewayKind {
        self.kind
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 503,
                body: "gateway unavailable".to_string(),
            });
        }
        self.orders_created.fetch_add(1, Ordering::SeqCst);

        Ok(GatewayOrder {
            gateway_order_id: format!("mock_{}", request.merchant_order_id),
            token: Some(format!("https://mock.test/pay/{}", request.merchant_order_id)),
            raw_response: serde_json::json!({ "amount": request.amount.to_string() }),
        })
    }

    async fn fetch_status(
        &self,
        merchant_order_id: &str,
        _gateway_order_id: Option<&str>,
    ) -> Result<GatewayPaymentStatus, GatewayError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(merchant_order_id)
            .cloned()
            .unwrap_or_else(|| GatewayPaymentStatus::pending("PENDING", serde_json::Value::Null)))
    }

    fn verify_webhook(&self, headers: &HeaderMap, _body: &[u8]) -> bool {
        headers
            .get(MOCK_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == MOCK_SIGNATURE)
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<Option<WebhookEvent>, GatewayError> {
        let hook: MockWebhook = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(Some(WebhookEvent {
            merchant_order_id: hook.merchant_order_id,
            gateway_order_id: hook.gateway_order_id,
            status: GatewayPaymentStatus {
                state: normalize(&hook.state),
                transaction_id: hook.transaction_id,
                payment_method: hook.payment_method,
                raw_state: hook.state,
                raw_response: serde_json::Value::Null,
            },
        }))
    }
}

pub fn build_service(db: &DatabaseConnection, gateway: Arc<MockGateway>) -> PaymentService {
    build_service_with_gateways(db, &[gateway])
}

/// Several scripted gateways registered side by side
pub fn build_service_with_gateways(
    db: &DatabaseConnection,
    gateways: &[Arc<MockGateway>],
) -> PaymentService {
    let registry = gateways
        .iter()
        .fold(GatewayRegistry::new(), |registry, gateway| registry.with(gateway.clone()));
    let settings = PaymentSettings {
        platform_admin_id: ADMIN_ID,
        ..PaymentSettings::default()
    };
    PaymentService::new(db.clone(), registry, settings)
}

pub async fn activate_gateway(db: &DatabaseConnection, kind: GatewayKind) -> gateway_settings::Model {
    let now = Utc::now();
    gateway_settings::ActiveModel {
        gateway: Set(kind),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert gateway setting")
}

pub async fn create_account(
    db: &DatabaseConnection,
    role: PartyRole,
    name: &str,
    referral_code: &str,
) -> accounts::Model {
    let now = Utc::now();
    accounts::ActiveModel {
        role: Set(role),
        name: Set(name.to_string()),
        referral_code: Set(referral_code.to_string()),
        referral_points: Set(0),
        wallet_balance: Set(Decimal::ZERO),
        is_subscription_plan_active: Set(false),
        active_subscription_plan_id: Set(None),
        subscription_expires_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert account")
}

pub async fn create_plan(
    db: &DatabaseConnection,
    role: PartyRole,
    price: Decimal,
    duration_days: i32,
    referral_points: i32,
    referral_discount: Option<(DiscountType, Decimal)>,
) -> subscription_plans::Model {
    subscription_plans::ActiveModel {
        name: Set(format!("{:?} plan {}d", role, duration_days)),
        role: Set(role),
        price: Set(price),
        duration_days: Set(duration_days),
        referral_points: Set(referral_points),
        referral_discount_type: Set(referral_discount.map(|(kind, _)| kind)),
        referral_discount_value: Set(referral_discount.map(|(_, value)| value)),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert plan")
}

pub async fn create_coupon(
    db: &DatabaseConnection,
    code: &str,
    discount_type: DiscountType,
    value: Decimal,
    valid_until: Option<DateTime<Utc>>,
) -> coupons::Model {
    coupons::ActiveModel {
        code: Set(code.to_string()),
        discount_type: Set(discount_type),
        discount_value: Set(value),
        max_discount: Set(None),
        valid_until: Set(valid_until),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert coupon")
}

/// Insert an already-paid subscription row directly, bypassing payment
pub async fn insert_paid_subscription(
    db: &DatabaseConnection,
    account_id: i32,
    plan_id: i32,
    status: SubscriptionStatus,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> user_subscriptions::Model {
    let now = Utc::now();
    user_subscriptions::ActiveModel {
        account_id: Set(account_id),
        plan_id: Set(plan_id),
        merchant_order_id: Set(format!("SEED-{}-{}", account_id, end_date.timestamp())),
        price: Set(Decimal::from(100)),
        discount_amount: Set(Decimal::ZERO),
        discount_type: Set(None),
        payable_amount: Set(Decimal::from(100)),
        code_type: Set(CodeType::NoCode),
        referral_or_coupon: Set(None),
        referrer_id: Set(None),
        start_date: Set(Some(start_date)),
        end_date: Set(Some(end_date)),
        status: Set(status),
        payment_method: Set(Some("upi".to_string())),
        gateway_response: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert subscription")
}
