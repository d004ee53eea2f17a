//! Double-entry ledger legs
//!
//! Every payment owns one `debited` leg (the paying customer or partner) and
//! one `credited` leg (the platform admin), keyed by
//! `(merchant_order_id, transaction_type)`. Legs are created together and
//! only ever updated in place, together.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use tracing::{debug, error};

use crate::entities::sea_orm_active_enums::{
    GatewayKind, PartyRole, PaymentFor, PaymentStatus, TransactionType, WalletType,
};
use crate::entities::{accounts, prelude::*, transactions, wallets};
use crate::error::{PaymentError, PaymentResult};
use crate::services::gateway::ActiveGateway;

/// What a payment is for and who pays, read back from its debit leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentDescriptor {
    pub party_role: PartyRole,
    pub party_id: i32,
    pub object_kind: PaymentFor,
    pub gateway_kind: GatewayKind,
}

impl PaymentDescriptor {
    pub fn from_debit_leg(leg: &transactions::Model) -> PaymentResult<Self> {
        let (party_role, party_id) = match (leg.customer_id, leg.partner_id) {
            (Some(id), None) => (PartyRole::Customer, id),
            (None, Some(id)) => (PartyRole::Partner, id),
            _ => {
                return Err(PaymentError::Consistency(format!(
                    "debit leg {} of {} must name exactly one paying party",
                    leg.id, leg.merchant_order_id
                )))
            }
        };

        Ok(Self {
            party_role,
            party_id,
            object_kind: leg.payment_for,
            gateway_kind: leg.payment_gateway,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LegPair {
    pub debit: transactions::Model,
    pub credit: transactions::Model,
}

/// Everything needed to write the provisional pair for a new payment
#[derive(Debug, Clone)]
pub struct NewPaymentLegs {
    pub party_role: PartyRole,
    pub party_id: i32,
    pub admin_id: i32,
    pub payment_for: PaymentFor,
    pub user_subscription_id: Option<i32>,
    pub wallet_id: Option<i32>,
    pub gateway: ActiveGateway,
    pub merchant_order_id: String,
    pub gateway_order_id: Option<String>,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Final (or latest) gateway view written onto both legs
#[derive(Debug, Clone)]
pub struct LegSettlement {
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub payment_method: Option<String>,
    pub gateway_state: String,
    pub settled_at: DateTime<Utc>,
}

/// Human-readable `particular` for a leg
pub fn narration(kind: PaymentFor, leg: TransactionType, status: PaymentStatus) -> String {
    let base = match (kind, leg) {
        (PaymentFor::Wallet, TransactionType::Debited) => "Wallet top-up",
        (PaymentFor::Wallet, TransactionType::Credited) => "Wallet top-up received",
        (PaymentFor::Subscription, TransactionType::Debited) => "Subscription purchase",
        (PaymentFor::Subscription, TransactionType::Credited) => "Subscription payment received",
    };

    match status {
        PaymentStatus::Completed => base.to_string(),
        PaymentStatus::Failed => format!("{} (failed)", base),
        PaymentStatus::Pending => format!("{} (pending)", base),
    }
}

pub async fn find_leg<C: ConnectionTrait>(
    conn: &C,
    merchant_order_id: &str,
    leg: TransactionType,
) -> PaymentResult<Option<transactions::Model>> {
    Ok(Transactions::find()
        .filter(transactions::Column::MerchantOrderId.eq(merchant_order_id))
        .filter(transactions::Column::TransactionType.eq(leg))
        .one(conn)
        .await?)
}

/// Load both legs and check them against each other and the business row
pub async fn load_pair<C: ConnectionTrait>(
    conn: &C,
    merchant_order_id: &str,
    expected_amount: Decimal,
) -> PaymentResult<LegPair> {
    let debit = find_leg(conn, merchant_order_id, TransactionType::Debited).await?;
    let credit = find_leg(conn, merchant_order_id, TransactionType::Credited).await?;

    let (Some(debit), Some(credit)) = (debit, credit) else {
        error!(
            merchant_order_id = %merchant_order_id,
            "Ledger pair incomplete"
        );
        return Err(PaymentError::Consistency(format!(
            "ledger pair for {} is incomplete",
            merchant_order_id
        )));
    };

    if debit.amount != credit.amount || debit.amount != expected_amount {
        error!(
            merchant_order_id = %merchant_order_id,
            debit = %debit.amount,
            credit = %credit.amount,
            expected = %expected_amount,
            "Ledger amounts disagree"
        );
        return Err(PaymentError::Consistency(format!(
            "ledger amounts for {} disagree",
            merchant_order_id
        )));
    }

    Ok(LegPair { debit, credit })
}

/// Insert the PENDING debit and credit legs of a new payment
pub async fn open_pair<C: ConnectionTrait>(conn: &C, new: &NewPaymentLegs) -> PaymentResult<()> {
    let leg = |leg_type: TransactionType| {
        let (customer_id, partner_id, admin_id) = match leg_type {
            TransactionType::Debited => match new.party_role {
                PartyRole::Customer => (Some(new.party_id), None, None),
                PartyRole::Partner => (None, Some(new.party_id), None),
            },
            TransactionType::Credited => (None, None, Some(new.admin_id)),
        };

        transactions::ActiveModel {
            customer_id: Set(customer_id),
            partner_id: Set(partner_id),
            admin_id: Set(admin_id),
            payment_for: Set(new.payment_for),
            user_subscription_id: Set(new.user_subscription_id),
            wallet_id: Set(new.wallet_id),
            payment_gateway: Set(new.gateway.kind),
            gateway_id: Set(new.gateway.setting_id),
            merchant_order_id: Set(new.merchant_order_id.clone()),
            gateway_order_id: Set(new.gateway_order_id.clone()),
            transaction_id: Set(None),
            payment_method: Set(None),
            payment_status: Set(PaymentStatus::Pending),
            gateway_state: Set(None),
            transaction_type: Set(leg_type),
            amount: Set(new.amount),
            particular: Set(narration(new.payment_for, leg_type, PaymentStatus::Pending)),
            created_at: Set(new.created_at),
            updated_at: Set(new.created_at),
            ..Default::default()
        }
    };

    Transactions::insert_many([leg(TransactionType::Debited), leg(TransactionType::Credited)])
        .exec(conn)
        .await?;

    debug!(
        merchant_order_id = %new.merchant_order_id,
        amount = %new.amount,
        "Opened ledger pair"
    );

    Ok(())
}

/// Write `settlement` onto one leg in place. With `skip_completed` the
/// update leaves an already COMPLETED leg untouched. Returns rows affected.
pub async fn settle_leg<C: ConnectionTrait>(
    conn: &C,
    merchant_order_id: &str,
    kind: PaymentFor,
    leg: TransactionType,
    settlement: &LegSettlement,
    skip_completed: bool,
) -> PaymentResult<u64> {
    let mut changes = transactions::ActiveModel {
        payment_status: Set(settlement.status),
        gateway_state: Set(Some(settlement.gateway_state.clone())),
        particular: Set(narration(kind, leg, settlement.status)),
        updated_at: Set(settlement.settled_at),
        ..Default::default()
    };
    if let Some(transaction_id) = &settlement.transaction_id {
        changes.transaction_id = Set(Some(transaction_id.clone()));
    }
    if let Some(method) = &settlement.payment_method {
        changes.payment_method = Set(Some(method.clone()));
    }

    let mut update = Transactions::update_many()
        .set(changes)
        .filter(transactions::Column::MerchantOrderId.eq(merchant_order_id))
        .filter(transactions::Column::TransactionType.eq(leg));
    if skip_completed {
        update = update.filter(transactions::Column::PaymentStatus.ne(PaymentStatus::Completed));
    }

    Ok(update.exec(conn).await?.rows_affected)
}

/// Settle both legs; each must match exactly one row
pub async fn settle_pair<C: ConnectionTrait>(
    conn: &C,
    merchant_order_id: &str,
    kind: PaymentFor,
    settlement: &LegSettlement,
    skip_completed: bool,
) -> PaymentResult<()> {
    for leg in [TransactionType::Debited, TransactionType::Credited] {
        let affected =
            settle_leg(conn, merchant_order_id, kind, leg, settlement, skip_completed).await?;
        if affected != 1 {
            error!(
                merchant_order_id = %merchant_order_id,
                leg = ?leg,
                affected,
                "Leg update did not match exactly one row"
            );
            return Err(PaymentError::Consistency(format!(
                "{:?} leg of {} matched {} rows",
                leg, merchant_order_id, affected
            )));
        }
    }
    Ok(())
}

/// Debit legs still PENDING and created within `[oldest, newest]`, least
/// recently touched first. Every poll moves a leg's `updated_at` forward, so
/// a full batch of stuck payments cannot hide newer ones.
pub async fn pending_debit_legs<C: ConnectionTrait>(
    conn: &C,
    oldest: DateTime<Utc>,
    newest: DateTime<Utc>,
    limit: u64,
) -> PaymentResult<Vec<transactions::Model>> {
    Ok(Transactions::find()
        .filter(transactions::Column::TransactionType.eq(TransactionType::Debited))
        .filter(transactions::Column::PaymentStatus.eq(PaymentStatus::Pending))
        .filter(transactions::Column::CreatedAt.gte(oldest))
        .filter(transactions::Column::CreatedAt.lte(newest))
        .order_by_asc(transactions::Column::UpdatedAt)
        .order_by_asc(transactions::Column::Id)
        .limit(limit)
        .all(conn)
        .await?)
}

/// Bump `updated_at` on the still-PENDING legs of a payment whose poll
/// failed, sending it to the back of the poll order
pub async fn touch_pending_legs<C: ConnectionTrait>(
    conn: &C,
    merchant_order_id: &str,
    now: DateTime<Utc>,
) -> PaymentResult<u64> {
    Ok(Transactions::update_many()
        .set(transactions::ActiveModel {
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(transactions::Column::MerchantOrderId.eq(merchant_order_id))
        .filter(transactions::Column::PaymentStatus.eq(PaymentStatus::Pending))
        .exec(conn)
        .await?
        .rows_affected)
}

/// Recompute the cached wallet balance from completed wallet rows
pub async fn refresh_wallet_balance<C: ConnectionTrait>(
    conn: &C,
    account_id: i32,
) -> PaymentResult<Decimal> {
    let rows = Wallets::find()
        .filter(wallets::Column::AccountId.eq(account_id))
        .filter(wallets::Column::PaymentStatus.eq(PaymentStatus::Completed))
        .all(conn)
        .await?;

    let balance = rows.iter().fold(Decimal::ZERO, |acc, row| match row.wallet_type {
        WalletType::Added => acc + row.amount,
        WalletType::Deducted => acc - row.amount,
    });

    Accounts::update_many()
        .set(accounts::ActiveModel {
            wallet_balance: Set(balance),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(accounts::Column::Id.eq(account_id))
        .exec(conn)
        .await?;

    debug!(account_id, balance = %balance, "Refreshed wallet balance");

    Ok(balance)
}
