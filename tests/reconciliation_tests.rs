mod common;

use chrono::{Duration, Utc};
use marketplace_backend::entities::sea_orm_active_enums::{
    GatewayKind, PartyRole, PaymentFor, PaymentStatus, SubscriptionStatus, TransactionType,
};
use marketplace_backend::entities::{prelude::*, transactions, user_subscriptions, wallets};
use marketplace_backend::error::PaymentError;
use marketplace_backend::jobs::pending_payment_sync::poll_pending_payments;
use marketplace_backend::services::gateway::GatewayPaymentStatus;
use marketplace_backend::services::reconciliation::BusinessSnapshot;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use crate::common::{
    activate_gateway, build_service, create_account, create_plan, setup_test_db, MockGateway,
    ADMIN_ID,
};

async fn legs(db: &DatabaseConnection, merchant_order_id: &str) -> Vec<transactions::Model> {
    Transactions::find()
        .filter(transactions::Column::MerchantOrderId.eq(merchant_order_id))
        .order_by_asc(transactions::Column::Id)
        .all(db)
        .await
        .unwrap()
}

async fn wallet_row(db: &DatabaseConnection, merchant_order_id: &str) -> wallets::Model {
    Wallets::find()
        .filter(wallets::Column::MerchantOrderId.eq(merchant_order_id))
        .one(db)
        .await
        .unwrap()
        .unwrap()
}

fn assert_paired(legs: &[transactions::Model], status: PaymentStatus, amount: Decimal) {
    assert_eq!(legs.len(), 2, "expected exactly one debit and one credit leg");
    let debit = legs
        .iter()
        .find(|l| l.transaction_type == TransactionType::Debited)
        .expect("debit leg");
    let credit = legs
        .iter()
        .find(|l| l.transaction_type == TransactionType::Credited)
        .expect("credit leg");

    assert_eq!(debit.amount, amount);
    assert_eq!(credit.amount, amount);
    assert_eq!(debit.payment_status, status);
    assert_eq!(credit.payment_status, status);
    assert_eq!(credit.admin_id, Some(ADMIN_ID));
    assert!(debit.admin_id.is_none());
}

#[tokio::test]
async fn test_wallet_top_up_completes_and_credits_balance() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());
    let customer = create_account(&db, PartyRole::Customer, "Asha", "ASHA01").await;

    let intent = service.open_wallet_top_up(customer.id, dec!(500)).await.unwrap();
    assert_eq!(intent.gateway, GatewayKind::Razorpay);
    assert_eq!(intent.gateway_order_id, format!("mock_{}", intent.merchant_order_id));

    let pending = legs(&db, &intent.merchant_order_id).await;
    assert_paired(&pending, PaymentStatus::Pending, dec!(500));
    assert_eq!(
        wallet_row(&db, &intent.merchant_order_id).await.payment_status,
        PaymentStatus::Pending
    );

    gateway.set_status(&intent.merchant_order_id, "COMPLETED", Some("upi"));
    let outcome = service.reconcile_payment(&intent.merchant_order_id).await.unwrap();

    assert!(outcome.applied);
    assert_eq!(outcome.final_status, PaymentStatus::Completed);
    assert_eq!(outcome.descriptor.object_kind, PaymentFor::Wallet);
    assert_eq!(outcome.descriptor.party_role, PartyRole::Customer);

    let wallet = wallet_row(&db, &intent.merchant_order_id).await;
    assert_eq!(wallet.payment_status, PaymentStatus::Completed);
    assert_eq!(wallet.payment_method.as_deref(), Some("upi"));

    let settled = legs(&db, &intent.merchant_order_id).await;
    assert_paired(&settled, PaymentStatus::Completed, dec!(500));
    for leg in &settled {
        assert_eq!(leg.payment_method.as_deref(), Some("upi"));
        assert_eq!(
            leg.transaction_id.as_deref(),
            Some(format!("TXN-{}", intent.merchant_order_id).as_str())
        );
        assert_eq!(leg.gateway_state.as_deref(), Some("COMPLETED"));
    }

    let account = Accounts::find_by_id(customer.id).one(&db).await.unwrap().unwrap();
    assert_eq!(account.wallet_balance, dec!(500));
}

#[tokio::test]
async fn test_repeated_completion_is_a_no_op() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());
    let customer = create_account(&db, PartyRole::Customer, "Ravi", "RAVI01").await;

    let intent = service.open_wallet_top_up(customer.id, dec!(250)).await.unwrap();
    gateway.set_status(&intent.merchant_order_id, "COMPLETED", Some("card"));

    let first = service.reconcile_payment(&intent.merchant_order_id).await.unwrap();
    let second = service.reconcile_payment(&intent.merchant_order_id).await.unwrap();

    assert!(first.applied);
    assert!(!second.applied);
    assert_eq!(second.final_status, PaymentStatus::Completed);
    assert_paired(
        &legs(&db, &intent.merchant_order_id).await,
        PaymentStatus::Completed,
        dec!(250),
    );

    let account = Accounts::find_by_id(customer.id).one(&db).await.unwrap().unwrap();
    assert_eq!(account.wallet_balance, dec!(250));
}

#[tokio::test]
async fn test_failed_subscription_payment_stays_retryable() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::PhonePe);
    activate_gateway(&db, GatewayKind::PhonePe).await;
    let service = build_service(&db, gateway.clone());
    let customer = create_account(&db, PartyRole::Customer, "Meera", "MEERA1").await;
    let plan = create_plan(&db, PartyRole::Customer, dec!(499), 30, 0, None).await;

    let first = service
        .open_subscription_purchase(customer.id, plan.id, None)
        .await
        .unwrap();
    gateway.set_status(&first.merchant_order_id, "FAILED", None);

    let outcome = service.reconcile_payment(&first.merchant_order_id).await.unwrap();
    assert!(outcome.applied);
    assert_eq!(outcome.final_status, PaymentStatus::Failed);
    assert_paired(
        &legs(&db, &first.merchant_order_id).await,
        PaymentStatus::Failed,
        dec!(499),
    );

    match outcome.snapshot {
        BusinessSnapshot::Subscription(row) => assert_eq!(row.status, SubscriptionStatus::Pending),
        other => panic!("unexpected snapshot {:?}", other),
    }

    let retry = service
        .open_subscription_purchase(customer.id, plan.id, None)
        .await
        .unwrap();
    assert_ne!(retry.merchant_order_id, first.merchant_order_id);

    gateway.set_status(&retry.merchant_order_id, "COMPLETED", Some("upi"));
    let outcome = service.reconcile_payment(&retry.merchant_order_id).await.unwrap();
    assert!(outcome.applied);

    let rows = UserSubscriptions::find()
        .filter(user_subscriptions::Column::AccountId.eq(customer.id))
        .order_by_asc(user_subscriptions::Column::Id)
        .all(&db)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].status, SubscriptionStatus::Pending);
    assert_eq!(rows[1].status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn test_failed_wallet_top_up_mirrors_failure() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());
    let customer = create_account(&db, PartyRole::Customer, "Kiran", "KIRAN1").await;

    let intent = service.open_wallet_top_up(customer.id, dec!(300)).await.unwrap();
    gateway.set_status(&intent.merchant_order_id, "FAILED", None);
    service.reconcile_payment(&intent.merchant_order_id).await.unwrap();

    assert_eq!(
        wallet_row(&db, &intent.merchant_order_id).await.payment_status,
        PaymentStatus::Failed
    );
    let account = Accounts::find_by_id(customer.id).one(&db).await.unwrap().unwrap();
    assert_eq!(account.wallet_balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_late_failure_after_completion_is_ignored() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());
    let customer = create_account(&db, PartyRole::Customer, "Dev", "DEV001").await;

    let intent = service.open_wallet_top_up(customer.id, dec!(100)).await.unwrap();
    gateway.set_status(&intent.merchant_order_id, "COMPLETED", Some("upi"));
    service.reconcile_payment(&intent.merchant_order_id).await.unwrap();

    let stale = GatewayPaymentStatus {
        state: PaymentStatus::Failed,
        transaction_id: None,
        payment_method: None,
        raw_state: "failed".to_string(),
        raw_response: serde_json::Value::Null,
    };
    let outcome = service
        .apply_gateway_status(&intent.merchant_order_id, stale)
        .await
        .unwrap();

    assert!(!outcome.applied);
    assert_eq!(outcome.final_status, PaymentStatus::Completed);
    assert_paired(
        &legs(&db, &intent.merchant_order_id).await,
        PaymentStatus::Completed,
        dec!(100),
    );
    assert_eq!(
        wallet_row(&db, &intent.merchant_order_id).await.payment_status,
        PaymentStatus::Completed
    );
}

#[tokio::test]
async fn test_pending_status_keeps_payment_open() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::PhonePe);
    activate_gateway(&db, GatewayKind::PhonePe).await;
    let service = build_service(&db, gateway.clone());
    let customer = create_account(&db, PartyRole::Customer, "Nila", "NILA01").await;

    let intent = service.open_wallet_top_up(customer.id, dec!(150)).await.unwrap();
    let outcome = service.reconcile_payment(&intent.merchant_order_id).await.unwrap();

    assert_eq!(outcome.final_status, PaymentStatus::Pending);
    let current = legs(&db, &intent.merchant_order_id).await;
    assert_paired(&current, PaymentStatus::Pending, dec!(150));
    assert!(current.iter().all(|l| l.gateway_state.as_deref() == Some("PENDING")));
    assert_eq!(gateway.status_calls(), 1);
}

#[tokio::test]
async fn test_unknown_merchant_order_is_not_found() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    let service = build_service(&db, gateway.clone());

    let err = service.reconcile_payment("MO-DOES-NOT-EXIST").await.unwrap_err();
    assert!(matches!(err, PaymentError::NotFound(_)));
    assert_eq!(gateway.status_calls(), 0);
}

#[tokio::test]
async fn test_gateway_failure_persists_nothing() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());
    let customer = create_account(&db, PartyRole::Customer, "Tara", "TARA01").await;
    let plan = create_plan(&db, PartyRole::Customer, dec!(999), 30, 0, None).await;

    gateway.fail_create(true);

    let err = service.open_wallet_top_up(customer.id, dec!(500)).await.unwrap_err();
    assert!(matches!(err, PaymentError::Gateway(_)));
    assert!(err.is_retryable());

    let err = service
        .open_subscription_purchase(customer.id, plan.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Gateway(_)));

    assert_eq!(Transactions::find().count(&db).await.unwrap(), 0);
    assert_eq!(Wallets::find().count(&db).await.unwrap(), 0);
    assert_eq!(UserSubscriptions::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_credit_leg_aborts_completion() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());
    let customer = create_account(&db, PartyRole::Customer, "Omar", "OMAR01").await;

    let intent = service.open_wallet_top_up(customer.id, dec!(500)).await.unwrap();
    Transactions::delete_many()
        .filter(transactions::Column::MerchantOrderId.eq(intent.merchant_order_id.as_str()))
        .filter(transactions::Column::TransactionType.eq(TransactionType::Credited))
        .exec(&db)
        .await
        .unwrap();

    gateway.set_status(&intent.merchant_order_id, "COMPLETED", Some("upi"));
    let err = service.reconcile_payment(&intent.merchant_order_id).await.unwrap_err();

    assert!(matches!(err, PaymentError::Consistency(_)));
    assert_eq!(
        wallet_row(&db, &intent.merchant_order_id).await.payment_status,
        PaymentStatus::Pending
    );
    let remaining = legs(&db, &intent.merchant_order_id).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_partner_payment_debits_partner_leg() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());
    let partner = create_account(&db, PartyRole::Partner, "Fixit Co", "FIXIT1").await;

    let intent = service.open_wallet_top_up(partner.id, dec!(1000)).await.unwrap();
    let debit = legs(&db, &intent.merchant_order_id)
        .await
        .into_iter()
        .find(|l| l.transaction_type == TransactionType::Debited)
        .unwrap();
    assert_eq!(debit.partner_id, Some(partner.id));
    assert!(debit.customer_id.is_none());

    gateway.set_status(&intent.merchant_order_id, "COMPLETED", Some("netbanking"));
    let outcome = service.reconcile_payment(&intent.merchant_order_id).await.unwrap();
    assert_eq!(outcome.descriptor.party_role, PartyRole::Partner);
}

#[tokio::test]
async fn test_poller_settles_stale_pending_payments() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());
    let customer = create_account(&db, PartyRole::Customer, "Sana", "SANA01").await;

    let paid = service.open_wallet_top_up(customer.id, dec!(200)).await.unwrap();
    let open = service.open_wallet_top_up(customer.id, dec!(300)).await.unwrap();
    gateway.set_status(&paid.merchant_order_id, "COMPLETED", Some("upi"));

    // Too fresh to poll yet
    let summary = poll_pending_payments(&service, Utc::now(), 120, 86_400)
        .await
        .unwrap();
    assert_eq!(summary.checked, 0);

    let later = Utc::now() + Duration::minutes(10);
    let summary = poll_pending_payments(&service, later, 120, 86_400).await.unwrap();
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.still_pending, 1);
    assert_eq!(summary.errors, 0);

    assert_eq!(
        wallet_row(&db, &paid.merchant_order_id).await.payment_status,
        PaymentStatus::Completed
    );
    assert_eq!(
        wallet_row(&db, &open.merchant_order_id).await.payment_status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn test_poller_reaches_newer_payments_behind_a_full_batch() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());
    let customer = create_account(&db, PartyRole::Customer, "Zoya", "ZOYA01").await;

    // A full batch of payments the gateway keeps reporting as PENDING
    for _ in 0..100 {
        service.open_wallet_top_up(customer.id, dec!(10)).await.unwrap();
    }
    let paid = service.open_wallet_top_up(customer.id, dec!(700)).await.unwrap();
    gateway.set_status(&paid.merchant_order_id, "COMPLETED", Some("upi"));

    let later = Utc::now() + Duration::minutes(10);
    let first = poll_pending_payments(&service, later, 120, 86_400).await.unwrap();
    assert_eq!(first.checked, 100);
    assert_eq!(first.still_pending, 100);

    let second = poll_pending_payments(&service, later, 120, 86_400).await.unwrap();
    assert_eq!(second.completed, 1);

    assert_eq!(
        wallet_row(&db, &paid.merchant_order_id).await.payment_status,
        PaymentStatus::Completed
    );
    let account = Accounts::find_by_id(customer.id).one(&db).await.unwrap().unwrap();
    assert_eq!(account.wallet_balance, dec!(700));
}

#[tokio::test]
async fn test_poll_error_moves_payment_to_back_of_queue() {
    let db = setup_test_db().await;
    let razorpay = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let opener = build_service(&db, razorpay.clone());
    let customer = create_account(&db, PartyRole::Customer, "Hari", "HARI01").await;

    let intent = opener.open_wallet_top_up(customer.id, dec!(120)).await.unwrap();
    let before = legs(&db, &intent.merchant_order_id).await;

    // Poller without an adapter for the payment's gateway
    let poller = build_service(&db, MockGateway::new(GatewayKind::PhonePe));
    let later = Utc::now() + Duration::minutes(10);
    let summary = poll_pending_payments(&poller, later, 120, 86_400).await.unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.errors, 1);

    let after = legs(&db, &intent.merchant_order_id).await;
    assert_paired(&after, PaymentStatus::Pending, dec!(120));
    for (old, new) in before.iter().zip(&after) {
        assert!(new.updated_at > old.updated_at);
    }
}

#[tokio::test]
async fn test_amount_mismatch_aborts_completion() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());
    let customer = create_account(&db, PartyRole::Customer, "Uma", "UMA001").await;

    let intent = service.open_wallet_top_up(customer.id, dec!(500)).await.unwrap();
    Transactions::update_many()
        .set(transactions::ActiveModel {
            amount: Set(dec!(499)),
            ..Default::default()
        })
        .filter(transactions::Column::MerchantOrderId.eq(intent.merchant_order_id.as_str()))
        .filter(transactions::Column::TransactionType.eq(TransactionType::Credited))
        .exec(&db)
        .await
        .unwrap();

    gateway.set_status(&intent.merchant_order_id, "COMPLETED", Some("upi"));
    let err = service.reconcile_payment(&intent.merchant_order_id).await.unwrap_err();

    assert!(matches!(err, PaymentError::Consistency(_)));
    assert_eq!(
        wallet_row(&db, &intent.merchant_order_id).await.payment_status,
        PaymentStatus::Pending
    );
    let current = legs(&db, &intent.merchant_order_id).await;
    assert!(current.iter().all(|l| l.payment_status == PaymentStatus::Pending));
    let account = Accounts::find_by_id(customer.id).one(&db).await.unwrap().unwrap();
    assert_eq!(account.wallet_balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_completion_after_failure_is_honored_for_subscription() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::PhonePe);
    activate_gateway(&db, GatewayKind::PhonePe).await;
    let service = build_service(&db, gateway.clone());
    let customer = create_account(&db, PartyRole::Customer, "Lata", "LATA01").await;
    let plan = create_plan(&db, PartyRole::Customer, dec!(499), 30, 0, None).await;

    let intent = service
        .open_subscription_purchase(customer.id, plan.id, None)
        .await
        .unwrap();
    gateway.set_status(&intent.merchant_order_id, "FAILED", None);
    service.reconcile_payment(&intent.merchant_order_id).await.unwrap();

    gateway.set_status(&intent.merchant_order_id, "COMPLETED", Some("upi"));
    let outcome = service.reconcile_payment(&intent.merchant_order_id).await.unwrap();

    assert!(outcome.applied);
    assert_eq!(outcome.final_status, PaymentStatus::Completed);
    match outcome.snapshot {
        BusinessSnapshot::Subscription(row) => assert_eq!(row.status, SubscriptionStatus::Active),
        other => panic!("unexpected snapshot {:?}", other),
    }
    assert_paired(
        &legs(&db, &intent.merchant_order_id).await,
        PaymentStatus::Completed,
        dec!(499),
    );

    let account = Accounts::find_by_id(customer.id).one(&db).await.unwrap().unwrap();
    assert!(account.is_subscription_plan_active);
}

#[tokio::test]
async fn test_completion_after_failure_is_honored_for_wallet() {
    let db = setup_test_db().await;
    let gateway = MockGateway::new(GatewayKind::Razorpay);
    activate_gateway(&db, GatewayKind::Razorpay).await;
    let service = build_service(&db, gateway.clone());
    let customer = create_account(&db, PartyRole::Customer, "Pooja", "POOJA1").await;

    let intent = service.open_wallet_top_up(customer.id, dec!(500)).await.unwrap();
    gateway.set_status(&intent.merchant_order_id, "FAILED", None);
    service.reconcile_payment(&intent.merchant_order_id).await.unwrap();
    assert_eq!(
        wallet_row(&db, &intent.merchant_order_id).await.payment_status,
        PaymentStatus::Failed
    );

    gateway.set_status(&intent.merchant_order_id, "COMPLETED", Some("upi"));
    let outcome = service.reconcile_payment(&intent.merchant_order_id).await.unwrap();

    assert!(outcome.applied);
    assert_eq!(
        wallet_row(&db, &intent.merchant_order_id).await.payment_status,
        PaymentStatus::Completed
    );
    assert_paired(
        &legs(&db, &intent.merchant_order_id).await,
        PaymentStatus::Completed,
        dec!(500),
    );
    let account = Accounts::find_by_id(customer.id).one(&db).await.unwrap().unwrap();
    assert_eq!(account.wallet_balance, dec!(500));
}
