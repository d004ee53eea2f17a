//! Referral points
//!
//! `referral_history` is the source of truth; `accounts.referral_points` is a
//! cached sum that is recomputed, never incremented.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};
use tracing::info;

use crate::entities::{accounts, prelude::*, referral_history};
use crate::error::PaymentResult;

/// Append one history entry to each side of a referral purchase
pub async fn record_referral_credit<C: ConnectionTrait>(
    conn: &C,
    referee_id: i32,
    referrer_id: i32,
    user_subscription_id: i32,
    points: i32,
    now: DateTime<Utc>,
) -> PaymentResult<()> {
    let entry = |account_id: i32, related_account_id: i32| referral_history::ActiveModel {
        account_id: Set(account_id),
        related_account_id: Set(related_account_id),
        user_subscription_id: Set(user_subscription_id),
        points: Set(points),
        created_at: Set(now),
        ..Default::default()
    };

    ReferralHistory::insert_many([entry(referee_id, referrer_id), entry(referrer_id, referee_id)])
        .exec(conn)
        .await?;

    info!(
        referee_id,
        referrer_id,
        user_subscription_id,
        points,
        "Recorded referral credit"
    );

    Ok(())
}

/// Recompute an account's cached points from its history
pub async fn refresh_referral_points<C: ConnectionTrait>(
    conn: &C,
    account_id: i32,
) -> PaymentResult<i32> {
    let total: i32 = referral_history_for(conn, account_id)
        .await?
        .iter()
        .map(|entry| entry.points)
        .sum();

    Accounts::update_many()
        .set(accounts::ActiveModel {
            referral_points: Set(total),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(accounts::Column::Id.eq(account_id))
        .exec(conn)
        .await?;

    Ok(total)
}

pub async fn referral_history_for<C: ConnectionTrait>(
    conn: &C,
    account_id: i32,
) -> PaymentResult<Vec<referral_history::Model>> {
    Ok(ReferralHistory::find()
        .filter(referral_history::Column::AccountId.eq(account_id))
        .order_by_asc(referral_history::Column::Id)
        .all(conn)
        .await?)
}
