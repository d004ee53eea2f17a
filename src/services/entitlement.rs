//! Subscription entitlements
//!
//! A paid plan is either `active` (nothing else running) or `in_queue`
//! behind the plans already bought. Expiry and promotion happen lazily in
//! [`reconcile_user_plans`] and from the expiry sweep job. The account row
//! carries a snapshot of the result so hot paths can skip the refresh.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::entities::sea_orm_active_enums::SubscriptionStatus;
use crate::entities::{accounts, prelude::*, subscription_plans, user_subscriptions};
use crate::error::{PaymentError, PaymentResult};

/// Upper bound on refresh passes per call. One pass settles expiry and
/// promotion; the second only confirms nothing moved.
pub const MAX_REFRESH_PASSES: usize = 2;

const RUNNING_STATUSES: [SubscriptionStatus; 2] =
    [SubscriptionStatus::Active, SubscriptionStatus::InQueue];

/// Entitlement snapshot as cached on the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanSnapshot {
    pub account_id: i32,
    pub is_active: bool,
    pub active_subscription_id: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PlanSnapshot {
    fn from_account(account: &accounts::Model) -> Self {
        Self {
            account_id: account.id,
            is_active: account.is_subscription_plan_active,
            active_subscription_id: account.active_subscription_plan_id,
            expires_at: account.subscription_expires_at,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_some_and(|expires| expires > now)
    }
}

/// Where a newly paid plan lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub subscription: user_subscriptions::Model,
    pub plan: Option<subscription_plans::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivePlanView {
    pub active_plan: Option<PlanEntry>,
    pub upcoming_plans: Vec<PlanEntry>,
    pub subscription_status: bool,
}

/// Place a plan of `duration_days` after `latest_end`, or start it now when
/// nothing is running.
pub fn plan_window(
    latest_end: Option<DateTime<Utc>>,
    duration_days: i32,
    now: DateTime<Utc>,
) -> Activation {
    let (status, start_date) = match latest_end {
        Some(end) if end > now => (SubscriptionStatus::InQueue, end),
        _ => (SubscriptionStatus::Active, now),
    };

    Activation {
        status,
        start_date,
        end_date: start_date + Duration::days(i64::from(duration_days)),
    }
}

/// Decide activation for `subscription_id` against the account's other
/// running plans. Callers hold [`lock_account`] so two payments of the same
/// account cannot both see nothing running.
pub async fn decide_activation<C: ConnectionTrait>(
    conn: &C,
    account_id: i32,
    subscription_id: i32,
    duration_days: i32,
    now: DateTime<Utc>,
) -> PaymentResult<Activation> {
    let latest = UserSubscriptions::find()
        .filter(user_subscriptions::Column::AccountId.eq(account_id))
        .filter(user_subscriptions::Column::Id.ne(subscription_id))
        .filter(user_subscriptions::Column::Status.is_in(RUNNING_STATUSES))
        .filter(user_subscriptions::Column::EndDate.gt(now))
        .order_by_desc(user_subscriptions::Column::EndDate)
        .one(conn)
        .await?;

    Ok(plan_window(
        latest.and_then(|row| row.end_date),
        duration_days,
        now,
    ))
}

pub async fn reconcile_user_plans(
    db: &DatabaseConnection,
    account_id: i32,
) -> PaymentResult<PlanSnapshot> {
    reconcile_user_plans_at(db, account_id, Utc::now()).await
}

/// Expire lapsed plans, promote the next queued one and refresh the
/// account's snapshot, as of `now`.
pub async fn reconcile_user_plans_at(
    db: &DatabaseConnection,
    account_id: i32,
    now: DateTime<Utc>,
) -> PaymentResult<PlanSnapshot> {
    let account = Accounts::find_by_id(account_id)
        .one(db)
        .await?
        .ok_or_else(|| PaymentError::NotFound(format!("Account {} not found", account_id)))?;

    let mut snapshot = PlanSnapshot::from_account(&account);

    for pass in 0..MAX_REFRESH_PASSES {
        if snapshot.is_fresh(now) {
            break;
        }

        let txn = db.begin().await?;
        let (next, changed) = refresh_plans(&txn, account_id, now).await?;
        txn.commit().await?;

        debug!(account_id, pass, changed, "Plan refresh pass");
        snapshot = next;
        if !changed {
            break;
        }
    }

    Ok(snapshot)
}

/// Lock the account row for the rest of `conn`'s transaction. Anything that
/// decides or rewrites an account's plan order takes this lock first.
pub async fn lock_account<C: ConnectionTrait>(
    conn: &C,
    account_id: i32,
) -> PaymentResult<accounts::Model> {
    Accounts::find_by_id(account_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| PaymentError::NotFound(format!("Account {} not found", account_id)))
}

async fn refresh_plans<C: ConnectionTrait>(
    conn: &C,
    account_id: i32,
    now: DateTime<Utc>,
) -> PaymentResult<(PlanSnapshot, bool)> {
    let account = lock_account(conn, account_id).await?;
    let previous = PlanSnapshot::from_account(&account);

    let expired = UserSubscriptions::update_many()
        .set(user_subscriptions::ActiveModel {
            status: Set(SubscriptionStatus::Expired),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(user_subscriptions::Column::AccountId.eq(account_id))
        .filter(user_subscriptions::Column::Status.is_in(RUNNING_STATUSES))
        .filter(user_subscriptions::Column::EndDate.lt(now))
        .exec(conn)
        .await?
        .rows_affected;

    let current = UserSubscriptions::find()
        .filter(user_subscriptions::Column::AccountId.eq(account_id))
        .filter(user_subscriptions::Column::Status.is_in(RUNNING_STATUSES))
        .filter(user_subscriptions::Column::EndDate.gte(now))
        .order_by_asc(user_subscriptions::Column::EndDate)
        .order_by_asc(user_subscriptions::Column::Id)
        .one(conn)
        .await?;

    let mut promoted = false;
    if let Some(current) = &current {
        // Everything behind the current plan waits in the queue
        UserSubscriptions::update_many()
            .set(user_subscriptions::ActiveModel {
                status: Set(SubscriptionStatus::InQueue),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(user_subscriptions::Column::AccountId.eq(account_id))
            .filter(user_subscriptions::Column::Status.eq(SubscriptionStatus::Active))
            .filter(user_subscriptions::Column::Id.ne(current.id))
            .exec(conn)
            .await?;

        if current.status == SubscriptionStatus::InQueue {
            UserSubscriptions::update_many()
                .set(user_subscriptions::ActiveModel {
                    status: Set(SubscriptionStatus::Active),
                    updated_at: Set(now),
                    ..Default::default()
                })
                .filter(user_subscriptions::Column::Id.eq(current.id))
                .exec(conn)
                .await?;
            promoted = true;

            info!(
                account_id,
                subscription_id = current.id,
                "Promoted queued plan"
            );
        }
    }

    let snapshot = PlanSnapshot {
        account_id,
        is_active: current.is_some(),
        active_subscription_id: current.as_ref().map(|row| row.id),
        expires_at: current.as_ref().and_then(|row| row.end_date),
    };

    let snapshot_changed = snapshot != previous;
    if snapshot_changed {
        Accounts::update_many()
            .set(accounts::ActiveModel {
                is_subscription_plan_active: Set(snapshot.is_active),
                active_subscription_plan_id: Set(snapshot.active_subscription_id),
                subscription_expires_at: Set(snapshot.expires_at),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(accounts::Column::Id.eq(account_id))
            .exec(conn)
            .await?;
    }

    if expired > 0 {
        info!(account_id, expired, "Expired lapsed plans");
    }

    Ok((snapshot, expired > 0 || promoted || snapshot_changed))
}

/// Refreshed view of the account's running and queued plans
pub async fn get_active_plan(
    db: &DatabaseConnection,
    account_id: i32,
) -> PaymentResult<ActivePlanView> {
    get_active_plan_at(db, account_id, Utc::now()).await
}

pub async fn get_active_plan_at(
    db: &DatabaseConnection,
    account_id: i32,
    now: DateTime<Utc>,
) -> PaymentResult<ActivePlanView> {
    let snapshot = reconcile_user_plans_at(db, account_id, now).await?;

    let rows = UserSubscriptions::find()
        .filter(user_subscriptions::Column::AccountId.eq(account_id))
        .filter(user_subscriptions::Column::Status.is_in(RUNNING_STATUSES))
        .order_by_asc(user_subscriptions::Column::StartDate)
        .order_by_asc(user_subscriptions::Column::Id)
        .find_also_related(SubscriptionPlans)
        .all(db)
        .await?;

    let mut active_plan = None;
    let mut upcoming_plans = Vec::new();
    for (subscription, plan) in rows {
        let entry = PlanEntry { subscription, plan };
        match entry.subscription.status {
            SubscriptionStatus::Active if active_plan.is_none() => active_plan = Some(entry),
            _ => upcoming_plans.push(entry),
        }
    }

    Ok(ActivePlanView {
        active_plan,
        upcoming_plans,
        subscription_status: snapshot.is_active,
    })
}

/// Refresh every account whose cached plan has lapsed. Returns how many
/// accounts were refreshed; per-account failures are logged and skipped.
pub async fn expire_due_plans(db: &DatabaseConnection, now: DateTime<Utc>) -> PaymentResult<usize> {
    let due = Accounts::find()
        .filter(accounts::Column::IsSubscriptionPlanActive.eq(true))
        .filter(accounts::Column::SubscriptionExpiresAt.lte(now))
        .all(db)
        .await?;

    let mut refreshed = 0;
    for account in due {
        match reconcile_user_plans_at(db, account.id, now).await {
            Ok(snapshot) => {
                refreshed += 1;
                debug!(
                    account_id = account.id,
                    is_active = snapshot.is_active,
                    "Refreshed lapsed plan"
                );
            }
            Err(e) => warn!(account_id = account.id, error = %e, "Failed to refresh lapsed plan"),
        }
    }

    Ok(refreshed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_window_starts_now_when_nothing_runs() {
        let activation = plan_window(None, 30, at(1));
        assert_eq!(activation.status, SubscriptionStatus::Active);
        assert_eq!(activation.start_date, at(1));
        assert_eq!(activation.end_date, at(31));
    }

    #[test]
    fn test_window_queues_behind_running_plan() {
        let activation = plan_window(Some(at(10)), 5, at(1));
        assert_eq!(activation.status, SubscriptionStatus::InQueue);
        assert_eq!(activation.start_date, at(10));
        assert_eq!(activation.end_date, at(15));
    }

    #[test]
    fn test_window_ignores_lapsed_plan() {
        let activation = plan_window(Some(at(1)), 5, at(2));
        assert_eq!(activation.status, SubscriptionStatus::Active);
        assert_eq!(activation.start_date, at(2));
    }

    #[test]
    fn test_snapshot_freshness() {
        let snapshot = PlanSnapshot {
            account_id: 1,
            is_active: true,
            active_subscription_id: Some(3),
            expires_at: Some(at(10)),
        };
        assert!(snapshot.is_fresh(at(9)));
        assert!(!snapshot.is_fresh(at(10)));

        let inactive = PlanSnapshot {
            is_active: false,
            ..snapshot
        };
        assert!(!inactive.is_fresh(at(9)));
    }
}
