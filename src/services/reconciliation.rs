//! Applying gateway results to the ledger
//!
//! Every payment, whoever pays and whatever for, goes through the same
//! routine. The [`PaymentDescriptor`] read from the debit leg decides which
//! business row is locked and how it transitions.
//!
//! COMPLETED is applied once: the business row is locked, its status guards
//! the update, and a second notification finds it already settled. FAILED
//! and PENDING only touch legs that are not yet COMPLETED, so a late
//! failure can never undo a success.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect,
    TransactionTrait,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::entities::sea_orm_active_enums::{
    CodeType, GatewayKind, PaymentFor, PaymentStatus, SubscriptionStatus, TransactionType,
};
use crate::entities::{prelude::*, subscription_plans, transactions, user_subscriptions, wallets};
use crate::error::{PaymentError, PaymentResult};
use crate::services::entitlement::{decide_activation, lock_account};
use crate::services::gateway::GatewayPaymentStatus;
use crate::services::ledger::{self, LegSettlement, PaymentDescriptor};
use crate::services::payments::PaymentService;
use crate::services::referral::{record_referral_credit, refresh_referral_points};

/// Business row behind a payment, as it stands after reconciliation
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum BusinessSnapshot {
    Subscription(user_subscriptions::Model),
    Wallet(wallets::Model),
}

impl BusinessSnapshot {
    /// Past the point where a gateway result can change it
    pub fn is_settled(&self) -> bool {
        match self {
            BusinessSnapshot::Subscription(row) => row.status != SubscriptionStatus::Pending,
            BusinessSnapshot::Wallet(row) => row.payment_status == PaymentStatus::Completed,
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            BusinessSnapshot::Subscription(row) => row.payable_amount,
            BusinessSnapshot::Wallet(row) => row.amount,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub merchant_order_id: String,
    pub descriptor: PaymentDescriptor,
    pub final_status: PaymentStatus,
    /// False when the notification changed nothing (duplicate or stale)
    pub applied: bool,
    pub snapshot: BusinessSnapshot,
}

impl PaymentService {
    /// Poll the gateway recorded on the payment and apply what it reports
    pub async fn reconcile_payment(&self, merchant_order_id: &str) -> PaymentResult<ReconcileOutcome> {
        let debit = self.debit_leg(merchant_order_id).await?;
        let descriptor = PaymentDescriptor::from_debit_leg(&debit)?;

        // The ledger's gateway, not the currently active one
        let gateway = self.gateways.get(descriptor.gateway_kind)?;
        let status = gateway
            .fetch_status(merchant_order_id, debit.gateway_order_id.as_deref())
            .await?;

        self.apply_gateway_status(merchant_order_id, status).await
    }

    /// Apply an already-obtained gateway status to a payment
    pub async fn apply_gateway_status(
        &self,
        merchant_order_id: &str,
        status: GatewayPaymentStatus,
    ) -> PaymentResult<ReconcileOutcome> {
        let debit = self.debit_leg(merchant_order_id).await?;
        let descriptor = PaymentDescriptor::from_debit_leg(&debit)?;
        let now = Utc::now();

        info!(
            merchant_order_id = %merchant_order_id,
            object_kind = ?descriptor.object_kind,
            party_role = ?descriptor.party_role,
            state = ?status.state,
            raw_state = %status.raw_state,
            "Applying gateway status"
        );

        match status.state {
            PaymentStatus::Completed => {
                let outcome = self
                    .apply_completed(merchant_order_id, descriptor, &status, now)
                    .await?;
                if outcome.applied {
                    self.after_completion(&outcome).await;
                }
                Ok(outcome)
            }
            PaymentStatus::Failed | PaymentStatus::Pending => {
                self.apply_unsettled(merchant_order_id, descriptor, &status, now)
                    .await
            }
        }
    }

    /// Verify, decode and apply a gateway webhook. `Ok(None)` for events
    /// that carry no payment state.
    pub async fn handle_webhook(
        &self,
        kind: GatewayKind,
        headers: &HeaderMap,
        body: &[u8],
    ) -> PaymentResult<Option<ReconcileOutcome>> {
        let gateway = self.gateways.get(kind)?;

        if !gateway.verify_webhook(headers, body) {
            warn!(gateway = ?kind, "Rejected webhook with invalid signature");
            return Err(PaymentError::Unauthorized(
                "Invalid webhook signature".to_string(),
            ));
        }

        let Some(event) = gateway.parse_webhook(body)? else {
            return Ok(None);
        };

        let debit = match (&event.merchant_order_id, &event.gateway_order_id) {
            (Some(merchant_order_id), _) => self.debit_leg(merchant_order_id).await?,
            (None, Some(gateway_order_id)) => Transactions::find()
                .filter(transactions::Column::GatewayOrderId.eq(gateway_order_id.as_str()))
                .filter(transactions::Column::TransactionType.eq(TransactionType::Debited))
                .one(&self.db)
                .await?
                .ok_or_else(|| {
                    PaymentError::NotFound(format!(
                        "No payment for gateway order {}",
                        gateway_order_id
                    ))
                })?,
            (None, None) => {
                return Err(PaymentError::Validation(
                    "Webhook does not identify an order".to_string(),
                ))
            }
        };

        if debit.payment_gateway != kind {
            warn!(
                merchant_order_id = %debit.merchant_order_id,
                expected = ?debit.payment_gateway,
                received = ?kind,
                "Webhook from a different gateway than the payment"
            );
            return Err(PaymentError::Validation(
                "Webhook gateway does not match the payment".to_string(),
            ));
        }

        self.apply_gateway_status(&debit.merchant_order_id, event.status)
            .await
            .map(Some)
    }

    async fn debit_leg(&self, merchant_order_id: &str) -> PaymentResult<transactions::Model> {
        ledger::find_leg(&self.db, merchant_order_id, TransactionType::Debited)
            .await?
            .ok_or_else(|| {
                PaymentError::NotFound(format!("Payment {} not found", merchant_order_id))
            })
    }

    async fn apply_completed(
        &self,
        merchant_order_id: &str,
        descriptor: PaymentDescriptor,
        status: &GatewayPaymentStatus,
        now: DateTime<Utc>,
    ) -> PaymentResult<ReconcileOutcome> {
        let txn = self.db.begin().await?;

        // Account before business row, the order plan refreshes lock in
        if descriptor.object_kind == PaymentFor::Subscription {
            lock_account(&txn, descriptor.party_id).await?;
        }

        let current = lock_business_row(&txn, merchant_order_id, descriptor.object_kind).await?;
        if current.is_settled() {
            txn.commit().await?;
            info!(merchant_order_id = %merchant_order_id, "Payment already settled");
            return Ok(outcome(merchant_order_id, descriptor, PaymentStatus::Completed, false, current));
        }

        ledger::load_pair(&txn, merchant_order_id, current.amount()).await?;

        let settlement = LegSettlement {
            status: PaymentStatus::Completed,
            transaction_id: status.transaction_id.clone(),
            payment_method: status.payment_method.clone(),
            gateway_state: status.raw_state.clone(),
            settled_at: now,
        };

        let snapshot = match current {
            BusinessSnapshot::Subscription(row) => {
                let Some((updated, plan)) = complete_subscription(&txn, row, status, now).await?
                else {
                    txn.commit().await?;
                    return self.already_settled(merchant_order_id, descriptor).await;
                };
                ledger::settle_pair(&txn, merchant_order_id, descriptor.object_kind, &settlement, false)
                    .await?;

                if let (CodeType::Referral, Some(referrer_id)) = (updated.code_type, updated.referrer_id) {
                    record_referral_credit(
                        &txn,
                        updated.account_id,
                        referrer_id,
                        updated.id,
                        plan.referral_points,
                        now,
                    )
                    .await?;
                }
                BusinessSnapshot::Subscription(updated)
            }
            BusinessSnapshot::Wallet(row) => {
                let Some(updated) = update_wallet(&txn, row, PaymentStatus::Completed, status, now).await?
                else {
                    txn.commit().await?;
                    return self.already_settled(merchant_order_id, descriptor).await;
                };
                ledger::settle_pair(&txn, merchant_order_id, descriptor.object_kind, &settlement, false)
                    .await?;
                BusinessSnapshot::Wallet(updated)
            }
        };

        txn.commit().await?;

        info!(
            merchant_order_id = %merchant_order_id,
            transaction_id = ?status.transaction_id,
            "Payment completed"
        );

        Ok(outcome(merchant_order_id, descriptor, PaymentStatus::Completed, true, snapshot))
    }

    async fn apply_unsettled(
        &self,
        merchant_order_id: &str,
        descriptor: PaymentDescriptor,
        status: &GatewayPaymentStatus,
        now: DateTime<Utc>,
    ) -> PaymentResult<ReconcileOutcome> {
        let txn = self.db.begin().await?;

        let current = lock_business_row(&txn, merchant_order_id, descriptor.object_kind).await?;
        let pair = ledger::load_pair(&txn, merchant_order_id, current.amount()).await?;

        if current.is_settled() || pair.debit.payment_status == PaymentStatus::Completed {
            txn.commit().await?;
            warn!(
                merchant_order_id = %merchant_order_id,
                state = ?status.state,
                "Ignoring stale status for completed payment"
            );
            return Ok(outcome(merchant_order_id, descriptor, PaymentStatus::Completed, false, current));
        }

        ledger::settle_pair(
            &txn,
            merchant_order_id,
            descriptor.object_kind,
            &LegSettlement {
                status: status.state,
                transaction_id: status.transaction_id.clone(),
                payment_method: status.payment_method.clone(),
                gateway_state: status.raw_state.clone(),
                settled_at: now,
            },
            true,
        )
        .await?;

        // The subscription row stays pending so the plan can be bought again;
        // a wallet intent mirrors the ledger.
        let snapshot = match current {
            BusinessSnapshot::Wallet(row) => {
                let fallback = row.clone();
                let updated = update_wallet(&txn, row, status.state, status, now).await?;
                BusinessSnapshot::Wallet(updated.unwrap_or(fallback))
            }
            subscription @ BusinessSnapshot::Subscription(_) => subscription,
        };

        txn.commit().await?;

        if status.state == PaymentStatus::Failed {
            warn!(
                merchant_order_id = %merchant_order_id,
                raw_state = %status.raw_state,
                "Payment failed"
            );
        }

        Ok(outcome(merchant_order_id, descriptor, status.state, true, snapshot))
    }

    /// Cached projections refreshed after a completed payment commits.
    /// Failures here are logged; the payment itself already stands.
    async fn after_completion(&self, outcome: &ReconcileOutcome) {
        match &outcome.snapshot {
            BusinessSnapshot::Wallet(row) => {
                if let Err(e) = ledger::refresh_wallet_balance(&self.db, row.account_id).await {
                    warn!(account_id = row.account_id, error = %e, "Failed to refresh wallet balance");
                }
            }
            BusinessSnapshot::Subscription(row) => {
                if let Err(e) = self.reconcile_user_plans(row.account_id).await {
                    warn!(account_id = row.account_id, error = %e, "Failed to refresh plans");
                }

                if row.code_type == CodeType::Referral {
                    for account_id in [Some(row.account_id), row.referrer_id].into_iter().flatten() {
                        if let Err(e) = refresh_referral_points(&self.db, account_id).await {
                            warn!(account_id, error = %e, "Failed to refresh referral points");
                        }
                    }
                }
            }
        }
    }

    async fn already_settled(
        &self,
        merchant_order_id: &str,
        descriptor: PaymentDescriptor,
    ) -> PaymentResult<ReconcileOutcome> {
        let current = read_business_row(&self.db, merchant_order_id, descriptor.object_kind).await?;
        Ok(outcome(merchant_order_id, descriptor, PaymentStatus::Completed, false, current))
    }
}

fn outcome(
    merchant_order_id: &str,
    descriptor: PaymentDescriptor,
    final_status: PaymentStatus,
    applied: bool,
    snapshot: BusinessSnapshot,
) -> ReconcileOutcome {
    ReconcileOutcome {
        merchant_order_id: merchant_order_id.to_string(),
        descriptor,
        final_status,
        applied,
        snapshot,
    }
}

/// Read the business row with a row lock held for the rest of `conn`'s
/// transaction
async fn lock_business_row<C: ConnectionTrait>(
    conn: &C,
    merchant_order_id: &str,
    kind: PaymentFor,
) -> PaymentResult<BusinessSnapshot> {
    let row = match kind {
        PaymentFor::Subscription => UserSubscriptions::find()
            .filter(user_subscriptions::Column::MerchantOrderId.eq(merchant_order_id))
            .lock_exclusive()
            .one(conn)
            .await?
            .map(BusinessSnapshot::Subscription),
        PaymentFor::Wallet => Wallets::find()
            .filter(wallets::Column::MerchantOrderId.eq(merchant_order_id))
            .lock_exclusive()
            .one(conn)
            .await?
            .map(BusinessSnapshot::Wallet),
    };

    row.ok_or_else(|| {
        PaymentError::NotFound(format!("{:?} for {} not found", kind, merchant_order_id))
    })
}

async fn read_business_row<C: ConnectionTrait>(
    conn: &C,
    merchant_order_id: &str,
    kind: PaymentFor,
) -> PaymentResult<BusinessSnapshot> {
    let row = match kind {
        PaymentFor::Subscription => UserSubscriptions::find()
            .filter(user_subscriptions::Column::MerchantOrderId.eq(merchant_order_id))
            .one(conn)
            .await?
            .map(BusinessSnapshot::Subscription),
        PaymentFor::Wallet => Wallets::find()
            .filter(wallets::Column::MerchantOrderId.eq(merchant_order_id))
            .one(conn)
            .await?
            .map(BusinessSnapshot::Wallet),
    };

    row.ok_or_else(|| {
        PaymentError::NotFound(format!("{:?} for {} not found", kind, merchant_order_id))
    })
}

/// Move a pending subscription to `active` or `in_queue`. `None` when the
/// row was no longer pending.
async fn complete_subscription<C: ConnectionTrait>(
    conn: &C,
    row: user_subscriptions::Model,
    status: &GatewayPaymentStatus,
    now: DateTime<Utc>,
) -> PaymentResult<Option<(user_subscriptions::Model, subscription_plans::Model)>> {
    let plan = SubscriptionPlans::find_by_id(row.plan_id)
        .one(conn)
        .await?
        .ok_or_else(|| {
            PaymentError::Consistency(format!(
                "plan {} of subscription {} is missing",
                row.plan_id, row.id
            ))
        })?;

    let activation = decide_activation(conn, row.account_id, row.id, plan.duration_days, now).await?;

    let mut changes = user_subscriptions::ActiveModel {
        status: Set(activation.status),
        start_date: Set(Some(activation.start_date)),
        end_date: Set(Some(activation.end_date)),
        gateway_response: Set(Some(status.raw_response.clone())),
        updated_at: Set(now),
        ..Default::default()
    };
    if let Some(method) = &status.payment_method {
        changes.payment_method = Set(Some(method.clone()));
    }

    let affected = UserSubscriptions::update_many()
        .set(changes)
        .filter(user_subscriptions::Column::Id.eq(row.id))
        .filter(user_subscriptions::Column::Status.eq(SubscriptionStatus::Pending))
        .exec(conn)
        .await?
        .rows_affected;
    if affected == 0 {
        return Ok(None);
    }

    info!(
        subscription_id = row.id,
        account_id = row.account_id,
        status = ?activation.status,
        start_date = %activation.start_date,
        end_date = %activation.end_date,
        "Subscription paid"
    );

    let updated = UserSubscriptions::find_by_id(row.id)
        .one(conn)
        .await?
        .ok_or_else(|| PaymentError::NotFound(format!("Subscription {} not found", row.id)))?;

    Ok(Some((updated, plan)))
}

/// Write `new_status` onto a wallet row that is not yet COMPLETED. `None`
/// when the guard matched nothing.
async fn update_wallet<C: ConnectionTrait>(
    conn: &C,
    row: wallets::Model,
    new_status: PaymentStatus,
    status: &GatewayPaymentStatus,
    now: DateTime<Utc>,
) -> PaymentResult<Option<wallets::Model>> {
    let mut changes = wallets::ActiveModel {
        payment_status: Set(new_status),
        gateway_response: Set(Some(status.raw_response.clone())),
        updated_at: Set(now),
        ..Default::default()
    };
    if let Some(method) = &status.payment_method {
        changes.payment_method = Set(Some(method.clone()));
    }

    let affected = Wallets::update_many()
        .set(changes)
        .filter(wallets::Column::Id.eq(row.id))
        .filter(wallets::Column::PaymentStatus.ne(PaymentStatus::Completed))
        .exec(conn)
        .await?
        .rows_affected;
    if affected == 0 {
        return Ok(None);
    }

    Ok(Wallets::find_by_id(row.id).one(conn).await?)
}
