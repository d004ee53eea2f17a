//! Opening payment intents
//!
//! The gateway order is created first; only once it exists are the business
//! row and the PENDING ledger pair written, in one database transaction. A
//! gateway failure therefore leaves no local trace.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, TransactionTrait};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::PaymentSettings;
use crate::entities::sea_orm_active_enums::{
    GatewayKind, PaymentFor, PaymentStatus, SubscriptionStatus, WalletType,
};
use crate::entities::{prelude::*, user_subscriptions, wallets};
use crate::error::{PaymentError, PaymentResult};
use crate::services::gateway::{resolve_active_gateway, OrderRequest};
use crate::services::ledger::{self, NewPaymentLegs};
use crate::services::payments::PaymentService;
use crate::services::pricing::resolve_code;

/// What the client needs to complete payment at the gateway
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub merchant_order_id: String,
    pub amount: Decimal,
    pub gateway: GatewayKind,
    pub gateway_order_id: String,
    pub gateway_token: Option<String>,
}

/// Fresh merchant order id: `MO`, a UTC timestamp and a random suffix.
pub fn new_merchant_order_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("MO{}{}", now.format("%Y%m%d%H%M%S"), &suffix[..10]).to_uppercase()
}

fn invoice_number(merchant_order_id: &str) -> String {
    format!("INV-{}", merchant_order_id.trim_start_matches("MO"))
}

pub fn validate_top_up(amount: Decimal, settings: &PaymentSettings) -> PaymentResult<()> {
    if amount <= Decimal::ZERO {
        return Err(PaymentError::Validation(
            "Amount must be greater than zero".to_string(),
        ));
    }
    if amount.normalize().scale() > 2 {
        return Err(PaymentError::Validation(
            "Amount cannot have more than two decimal places".to_string(),
        ));
    }
    if amount < settings.wallet_min_top_up || amount > settings.wallet_max_top_up {
        return Err(PaymentError::Validation(format!(
            "Amount must be between {} and {}",
            settings.wallet_min_top_up, settings.wallet_max_top_up
        )));
    }
    Ok(())
}

impl PaymentService {
    /// Open a subscription purchase for `account_id`.
    ///
    /// # Arguments
    /// * `code` - optional referral code of another account, or a coupon code
    pub async fn open_subscription_purchase(
        &self,
        account_id: i32,
        plan_id: i32,
        code: Option<&str>,
    ) -> PaymentResult<PaymentIntent> {
        let now = Utc::now();

        let account = Accounts::find_by_id(account_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Account {} not found", account_id)))?;

        let plan = SubscriptionPlans::find_by_id(plan_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Plan {} not found", plan_id)))?;

        if !plan.is_active {
            return Err(PaymentError::Validation("Plan is not available".to_string()));
        }
        if plan.role != account.role {
            return Err(PaymentError::Validation(
                "Plan is not offered to this account".to_string(),
            ));
        }

        let resolved = resolve_code(&self.db, &account, &plan, code, now).await?;
        let breakdown = &resolved.breakdown;
        if breakdown.payable_amount <= Decimal::ZERO {
            return Err(PaymentError::Validation(
                "Payable amount must be greater than zero".to_string(),
            ));
        }

        let active = resolve_active_gateway(&self.db).await?;
        let gateway = self.gateways.get(active.kind)?;

        let merchant_order_id = new_merchant_order_id(now);
        let order = gateway
            .create_order(&OrderRequest {
                merchant_order_id: merchant_order_id.clone(),
                amount: breakdown.payable_amount,
                description: format!("Subscription: {}", plan.name),
            })
            .await?;

        let txn = self.db.begin().await?;

        let subscription = user_subscriptions::ActiveModel {
            account_id: Set(account.id),
            plan_id: Set(plan.id),
            merchant_order_id: Set(merchant_order_id.clone()),
            price: Set(breakdown.price),
            discount_amount: Set(breakdown.discount_amount),
            discount_type: Set(breakdown.discount_type),
            payable_amount: Set(breakdown.payable_amount),
            code_type: Set(resolved.code_type),
            referral_or_coupon: Set(resolved.code.clone()),
            referrer_id: Set(resolved.referrer_id),
            start_date: Set(None),
            end_date: Set(None),
            status: Set(SubscriptionStatus::Pending),
            payment_method: Set(None),
            gateway_response: Set(Some(order.raw_response.clone())),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        ledger::open_pair(
            &txn,
            &NewPaymentLegs {
                party_role: account.role,
                party_id: account.id,
                admin_id: self.settings.platform_admin_id,
                payment_for: PaymentFor::Subscription,
                user_subscription_id: Some(subscription.id),
                wallet_id: None,
                gateway: active,
                merchant_order_id: merchant_order_id.clone(),
                gateway_order_id: Some(order.gateway_order_id.clone()),
                amount: breakdown.payable_amount,
                created_at: now,
            },
        )
        .await?;

        txn.commit().await?;

        info!(
            merchant_order_id = %merchant_order_id,
            account_id,
            plan_id,
            code_type = ?resolved.code_type,
            amount = %breakdown.payable_amount,
            gateway = ?active.kind,
            "Opened subscription purchase"
        );

        Ok(PaymentIntent {
            merchant_order_id,
            amount: breakdown.payable_amount,
            gateway: active.kind,
            gateway_order_id: order.gateway_order_id,
            gateway_token: order.token,
        })
    }

    pub async fn open_wallet_top_up(
        &self,
        account_id: i32,
        amount: Decimal,
    ) -> PaymentResult<PaymentIntent> {
        validate_top_up(amount, &self.settings)?;
        let now = Utc::now();

        let account = Accounts::find_by_id(account_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Account {} not found", account_id)))?;

        let active = resolve_active_gateway(&self.db).await?;
        let gateway = self.gateways.get(active.kind)?;

        let merchant_order_id = new_merchant_order_id(now);
        let order = gateway
            .create_order(&OrderRequest {
                merchant_order_id: merchant_order_id.clone(),
                amount,
                description: "Wallet top-up".to_string(),
            })
            .await?;

        let txn = self.db.begin().await?;

        let wallet = wallets::ActiveModel {
            account_id: Set(account.id),
            payment_method: Set(None),
            payment_status: Set(PaymentStatus::Pending),
            merchant_order_id: Set(merchant_order_id.clone()),
            invoice_no: Set(invoice_number(&merchant_order_id)),
            amount: Set(amount),
            wallet_type: Set(WalletType::Added),
            gateway_response: Set(Some(order.raw_response.clone())),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        ledger::open_pair(
            &txn,
            &NewPaymentLegs {
                party_role: account.role,
                party_id: account.id,
                admin_id: self.settings.platform_admin_id,
                payment_for: PaymentFor::Wallet,
                user_subscription_id: None,
                wallet_id: Some(wallet.id),
                gateway: active,
                merchant_order_id: merchant_order_id.clone(),
                gateway_order_id: Some(order.gateway_order_id.clone()),
                amount,
                created_at: now,
            },
        )
        .await?;

        txn.commit().await?;

        info!(
            merchant_order_id = %merchant_order_id,
            account_id,
            amount = %amount,
            gateway = ?active.kind,
            "Opened wallet top-up"
        );

        Ok(PaymentIntent {
            merchant_order_id,
            amount,
            gateway: active.kind,
            gateway_order_id: order.gateway_order_id,
            gateway_token: order.token,
        })
    }
}
