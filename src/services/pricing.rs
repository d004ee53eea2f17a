//! Price breakdown for subscription purchases
//!
//! A purchase code is either another account's referral code or a coupon.
//! Resolution happens before any gateway call so a bad code never opens an
//! order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::Serialize;

use crate::entities::sea_orm_active_enums::{CodeType, DiscountType};
use crate::entities::{accounts, coupons, prelude::*, subscription_plans};
use crate::error::{PaymentError, PaymentResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    pub price: Decimal,
    pub discount_amount: Decimal,
    pub discount_type: Option<DiscountType>,
    pub payable_amount: Decimal,
}

/// Outcome of resolving the optional purchase code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCode {
    pub code_type: CodeType,
    /// Code as entered, trimmed
    pub code: Option<String>,
    pub referrer_id: Option<i32>,
    pub breakdown: PriceBreakdown,
}

/// Discount for `price`: percentage of the price (capped by `max_discount`)
/// or a flat amount, never negative and never more than the price.
pub fn discount_amount(
    price: Decimal,
    discount_type: DiscountType,
    value: Decimal,
    max_discount: Option<Decimal>,
) -> Decimal {
    let raw = match discount_type {
        DiscountType::Percentage => (price * value / Decimal::ONE_HUNDRED).round_dp(2),
        DiscountType::Flat => value,
    };

    let capped = match max_discount {
        Some(cap) if raw > cap => cap,
        _ => raw,
    };

    capped.max(Decimal::ZERO).min(price)
}

pub fn price_breakdown(
    price: Decimal,
    discount: Option<(DiscountType, Decimal, Option<Decimal>)>,
) -> PriceBreakdown {
    match discount {
        Some((discount_type, value, cap)) => {
            let discount_amount = discount_amount(price, discount_type, value, cap);
            PriceBreakdown {
                price,
                discount_amount,
                discount_type: Some(discount_type),
                payable_amount: price - discount_amount,
            }
        }
        None => PriceBreakdown {
            price,
            discount_amount: Decimal::ZERO,
            discount_type: None,
            payable_amount: price,
        },
    }
}

/// Resolve `code` for `buyer` purchasing `plan`.
///
/// Referral codes are checked first, then coupons. A referral code that
/// belongs to the buyer is rejected.
pub async fn resolve_code<C: ConnectionTrait>(
    conn: &C,
    buyer: &accounts::Model,
    plan: &subscription_plans::Model,
    code: Option<&str>,
    now: DateTime<Utc>,
) -> PaymentResult<ResolvedCode> {
    let code = code.map(str::trim).filter(|c| !c.is_empty());

    let Some(code) = code else {
        return Ok(ResolvedCode {
            code_type: CodeType::NoCode,
            code: None,
            referrer_id: None,
            breakdown: price_breakdown(plan.price, None),
        });
    };

    let referrer = Accounts::find()
        .filter(accounts::Column::ReferralCode.eq(code))
        .one(conn)
        .await?;

    if let Some(referrer) = referrer {
        if referrer.id == buyer.id {
            return Err(PaymentError::Validation(
                "You cannot use your own referral code".to_string(),
            ));
        }

        let discount = match (plan.referral_discount_type, plan.referral_discount_value) {
            (Some(kind), Some(value)) => Some((kind, value, None)),
            _ => None,
        };

        return Ok(ResolvedCode {
            code_type: CodeType::Referral,
            code: Some(code.to_string()),
            referrer_id: Some(referrer.id),
            breakdown: price_breakdown(plan.price, discount),
        });
    }

    let coupon = Coupons::find()
        .filter(coupons::Column::Code.eq(code))
        .filter(coupons::Column::IsActive.eq(true))
        .one(conn)
        .await?
        .filter(|c| c.valid_until.is_none_or(|until| until >= now))
        .ok_or_else(|| PaymentError::Validation("Invalid referral or coupon code".to_string()))?;

    Ok(ResolvedCode {
        code_type: CodeType::Coupon,
        code: Some(code.to_string()),
        referrer_id: None,
        breakdown: price_breakdown(
            plan.price,
            Some((coupon.discount_type, coupon.discount_value, coupon.max_discount)),
        ),
    })
}
