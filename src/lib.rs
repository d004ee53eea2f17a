// src/lib.rs

use axum::{
    routing::{get, post},
    Router,
};
use services::payments::PaymentService;

#[derive(Clone)]
pub struct AppState {
    pub payments: PaymentService,
}

pub mod config;
pub mod error;

pub mod entities {
    pub mod prelude;
    pub mod sea_orm_active_enums;
    pub mod accounts;
    pub mod coupons;
    pub mod gateway_settings;
    pub mod referral_history;
    pub mod subscription_plans;
    pub mod transactions;
    pub mod user_subscriptions;
    pub mod wallets;
}

pub mod services {
    pub mod gateway;
    pub mod phonepe;
    pub mod razorpay;
    pub mod pricing;
    pub mod ledger;
    pub mod referral;
    pub mod entitlement;
    pub mod payments;
    pub mod payment_intent;
    pub mod reconciliation;
}

pub mod jobs {
    pub mod plan_expiry_sync;
    pub mod pending_payment_sync;
}

pub mod models {
    pub mod error;
    pub mod payment;
    pub mod subscription;
}

pub mod handlers {
    pub mod payments;
    pub mod subscription;
    pub mod webhooks;
}

/// API routes, without transport layers (tracing, CORS) so tests can drive
/// it directly
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/subscriptions/purchase",
            post(handlers::payments::purchase_subscription),
        )
        .route(
            "/api/subscriptions/{account_id}/active",
            get(handlers::subscription::get_active_plan),
        )
        .route("/api/wallet/top-up", post(handlers::payments::top_up_wallet))
        .route(
            "/api/payments/{merchant_order_id}/status",
            post(handlers::payments::check_payment_status),
        )
        .route(
            "/api/webhooks/{gateway}",
            post(handlers::webhooks::receive_webhook),
        )
        .with_state(state)
}
