mod common;

use chrono::{Duration, Utc};
use marketplace_backend::entities::sea_orm_active_enums::{
    CodeType, DiscountType, GatewayKind, PartyRole,
};
use marketplace_backend::entities::{prelude::*, user_subscriptions};
use marketplace_backend::error::PaymentError;
use marketplace_backend::services::referral::referral_history_for;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

use crate::common::{
    activate_gateway, build_service, create_account, create_coupon, create_plan, setup_test_db,
    MockGateway,
};

#[tokio::test]
async fn test_referral_purchase_credits_both_sides_once() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());

    let referrer = create_account(&db, PartyRole::Customer, "Priya", "PRIYA10").await;
    let buyer = create_account(&db, PartyRole::Customer, "Kabir", "KABIR10").await;
    let plan = create_plan(
        &db,
        PartyRole::Customer,
        dec!(1000),
        30,
        10,
        Some((DiscountType::Percentage, dec!(10))),
    )
    .await;

    let intent = service
        .open_subscription_purchase(buyer.id, plan.id, Some(" PRIYA10 "))
        .await
        .unwrap();
    assert_eq!(intent.amount, dec!(900));

    let row = UserSubscriptions::find()
        .filter(user_subscriptions::Column::MerchantOrderId.eq(intent.merchant_order_id.as_str()))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.code_type, CodeType::Referral);
    assert_eq!(row.referrer_id, Some(referrer.id));
    assert_eq!(row.discount_amount, dec!(100));
    assert_eq!(row.referral_or_coupon.as_deref(), Some("PRIYA10"));

    gateway.set_status(&intent.merchant_order_id, "COMPLETED", Some("upi"));
    service.reconcile_payment(&intent.merchant_order_id).await.unwrap();
    // Duplicate notification must not credit again
    service.reconcile_payment(&intent.merchant_order_id).await.unwrap();

    let buyer_after = Accounts::find_by_id(buyer.id).one(&db).await.unwrap().unwrap();
    let referrer_after = Accounts::find_by_id(referrer.id).one(&db).await.unwrap().unwrap();
    assert_eq!(buyer_after.referral_points, 10);
    assert_eq!(referrer_after.referral_points, 10);

    let buyer_history = referral_history_for(&db, buyer.id).await.unwrap();
    let referrer_history = referral_history_for(&db, referrer.id).await.unwrap();
    assert_eq!(buyer_history.len(), 1);
    assert_eq!(referrer_history.len(), 1);
    assert_eq!(buyer_history[0].related_account_id, referrer.id);
    assert_eq!(referrer_history[0].related_account_id, buyer.id);
    assert_eq!(buyer_history[0].user_subscription_id, row.id);
    assert_eq!(referrer_history[0].points, 10);

    assert_eq!(ReferralHistory::find().count(&db).await.unwrap(), 2);
}

#[tokio::test]
async fn test_failed_referral_purchase_awards_nothing() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());

    let referrer = create_account(&db, PartyRole::Customer, "Anu", "ANU10").await;
    let buyer = create_account(&db, PartyRole::Customer, "Vik", "VIK10").await;
    let plan = create_plan(&db, PartyRole::Customer, dec!(500), 30, 10, None).await;

    let intent = service
        .open_subscription_purchase(buyer.id, plan.id, Some("ANU10"))
        .await
        .unwrap();
    gateway.set_status(&intent.merchant_order_id, "FAILED", None);
    service.reconcile_payment(&intent.merchant_order_id).await.unwrap();

    assert_eq!(ReferralHistory::find().count(&db).await.unwrap(), 0);
    let referrer_after = Accounts::find_by_id(referrer.id).one(&db).await.unwrap().unwrap();
    assert_eq!(referrer_after.referral_points, 0);
}

#[tokio::test]
async fn test_own_referral_code_is_rejected_before_gateway() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());

    let buyer = create_account(&db, PartyRole::Customer, "Sam", "SAM10").await;
    let plan = create_plan(&db, PartyRole::Customer, dec!(500), 30, 10, None).await;

    let err = service
        .open_subscription_purchase(buyer.id, plan.id, Some("SAM10"))
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::Validation(_)));
    assert_eq!(gateway.orders_created(), 0);
    assert_eq!(UserSubscriptions::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_coupon_discount_applies() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());

    let buyer = create_account(&db, PartyRole::Customer, "Ira", "IRA10").await;
    let plan = create_plan(&db, PartyRole::Customer, dec!(500), 30, 10, None).await;
    create_coupon(&db, "WELCOME100", DiscountType::Flat, dec!(100), None).await;

    let intent = service
        .open_subscription_purchase(buyer.id, plan.id, Some("WELCOME100"))
        .await
        .unwrap();
    assert_eq!(intent.amount, dec!(400));

    gateway.set_status(&intent.merchant_order_id, "COMPLETED", Some("card"));
    service.reconcile_payment(&intent.merchant_order_id).await.unwrap();

    let row = UserSubscriptions::find()
        .filter(user_subscriptions::Column::MerchantOrderId.eq(intent.merchant_order_id.as_str()))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.code_type, CodeType::Coupon);
    assert!(row.referrer_id.is_none());
    // Coupons never award referral points
    assert_eq!(ReferralHistory::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_expired_or_unknown_code_is_rejected() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());

    let buyer = create_account(&db, PartyRole::Customer, "Neel", "NEEL10").await;
    let plan = create_plan(&db, PartyRole::Customer, dec!(500), 30, 10, None).await;
    create_coupon(
        &db,
        "OLD50",
        DiscountType::Flat,
        dec!(50),
        Some(Utc::now() - Duration::days(1)),
    )
    .await;

    for code in ["OLD50", "NOPE"] {
        let err = service
            .open_subscription_purchase(buyer.id, plan.id, Some(code))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)), "code {}", code);
    }
    assert_eq!(gateway.orders_created(), 0);
}

#[tokio::test]
async fn test_plan_for_other_role_is_rejected() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());

    let customer = create_account(&db, PartyRole::Customer, "Maya", "MAYA10").await;
    let partner_plan = create_plan(&db, PartyRole::Partner, dec!(1500), 30, 0, None).await;

    let err = service
        .open_subscription_purchase(customer.id, partner_plan.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Validation(_)));

    let err = service
        .open_subscription_purchase(customer.id, 9_999, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::NotFound(_)));
}
