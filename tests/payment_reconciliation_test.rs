mod common;

use agrimarket_core::errors::ServiceError;
use agrimarket_core::services::payments::GatewayCallback;
use common::TestCore;
use rust_decimal_macros::dec;

fn reported(status: &str) -> GatewayCallback {
    GatewayCallback {
        payment_ref: Some("pay_123".to_string()),
        signature: Some("sig_abc".to_string()),
        status: Some(status.to_string()),
    }
}

#[tokio::test]
async fn create_charge_converts_to_minor_units_and_stores_the_reference() {
    let app = TestCore::new().await;
    let customer = app.seed_customer().await;
    let product = app.seed_product("Tomatoes", dec!(49.99), None).await;
    let placed = app.place_order(customer, product, 2).await;

    let charge = app.core.payments.create_charge(placed.id, customer).await.unwrap();

    assert_eq!(charge.amount_minor, 9998);
    assert_eq!(charge.currency, "INR");
    assert_eq!(charge.order_ids, vec![placed.id]);

    let calls = app.gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].amount_minor, 9998);
    assert_eq!(calls[0].receipt, format!("order_{}", placed.id));

    let row = app.order_row(placed.id).await;
    assert_eq!(row.gateway_order_id.as_deref(), Some(charge.gateway_order_id.as_str()));
    assert_eq!(row.payment_status, "PENDING");
}

#[tokio::test]
async fn create_charge_twice_reuses_the_reference_without_a_second_call() {
    let app = TestCore::new().await;
    let customer = app.seed_customer().await;
    let product = app.seed_product("Onions", dec!(30.00), None).await;
    let placed = app.place_order(customer, product, 1).await;

    let first = app.core.payments.create_charge(placed.id, customer).await.unwrap();
    let second = app.core.payments.create_charge(placed.id, customer).await.unwrap();

    assert_eq!(first.gateway_order_id, second.gateway_order_id);
    assert_eq!(first.amount_minor, second.amount_minor);
    assert_eq!(app.gateway.call_count(), 1);
}

#[tokio::test]
async fn a_failed_payment_gets_a_fresh_gateway_order_on_retry() {
    let app = TestCore::new().await;
    let customer = app.seed_customer().await;
    let product = app.seed_product("Potatoes", dec!(22.00), None).await;
    let placed = app.place_order(customer, product, 1).await;

    let first = app.core.payments.create_charge(placed.id, customer).await.unwrap();
    app.core
        .payments
        .reconcile(placed.id, reported("failed"))
        .await
        .unwrap();

    let retry = app.core.payments.create_charge(placed.id, customer).await.unwrap();

    assert_ne!(first.gateway_order_id, retry.gateway_order_id);
    assert_eq!(app.gateway.call_count(), 2);
    // The retry resets the payment to PENDING for the new attempt.
    assert_eq!(app.order_row(placed.id).await.payment_status, "PENDING");
}

#[tokio::test]
async fn charges_are_owner_only_and_gated_on_configuration() {
    let app = TestCore::new().await;
    let customer = app.seed_customer().await;
    let stranger = app.seed_customer().await;
    let product = app.seed_product("Garlic", dec!(90.00), None).await;
    let placed = app.place_order(customer, product, 1).await;

    let err = app.core.payments.create_charge(placed.id, stranger).await.unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    app.gateway.set_configured(false);
    let err = app.core.payments.create_charge(placed.id, customer).await.unwrap_err();
    assert!(matches!(err, ServiceError::ServiceUnavailable(_)));

    // Neither path reached the gateway.
    assert_eq!(app.gateway.call_count(), 0);
    assert!(app.order_row(placed.id).await.gateway_order_id.is_none());
}

#[tokio::test]
async fn gateway_failure_surfaces_and_leaves_the_order_unclaimed() {
    let app = TestCore::new().await;
    let customer = app.seed_customer().await;
    let product = app.seed_product("Ginger", dec!(120.00), None).await;
    let placed = app.place_order(customer, product, 1).await;

    app.gateway.set_fail(true);
    let err = app.core.payments.create_charge(placed.id, customer).await.unwrap_err();
    assert!(matches!(err, ServiceError::ExternalServiceError(_)));
    assert!(app.order_row(placed.id).await.gateway_order_id.is_none());

    // The next attempt succeeds normally.
    app.gateway.set_fail(false);
    app.core.payments.create_charge(placed.id, customer).await.unwrap();
}

#[tokio::test]
async fn bundle_amount_is_rounded_once_on_the_sum() {
    let app = TestCore::new().await;
    let customer = app.seed_customer().await;

    // Per-order rounding would give 12001 + 6500 + 6500 = 25001 paise;
    // the bundle must charge exactly 25000 for a 250.00 total.
    let a = app.seed_product("A", dec!(120.005), None).await;
    let b = app.seed_product("B", dec!(64.995), None).await;
    let c = app.seed_product("C", dec!(65.00), None).await;

    let first = app.place_order(customer, a, 1).await;
    let second = app.place_order(customer, b, 1).await;
    let third = app.place_order(customer, c, 1).await;

    let charge = app
        .core
        .payments
        .create_bundle_charge(&[first.id, second.id, third.id], customer)
        .await
        .unwrap();

    assert_eq!(charge.amount_minor, 25000);
    assert_eq!(app.gateway.call_count(), 1);

    // Every order carries the same reference; per-order totals stand.
    for (id, total) in [
        (first.id, dec!(120.005)),
        (second.id, dec!(64.995)),
        (third.id, dec!(65.00)),
    ] {
        let row = app.order_row(id).await;
        assert_eq!(row.gateway_order_id.as_deref(), Some(charge.gateway_order_id.as_str()));
        assert_eq!(row.total_amount, total);
        assert_eq!(row.payment_status, "PENDING");
    }
}

#[tokio::test]
async fn bundle_preconditions_are_all_or_nothing() {
    let app = TestCore::new().await;
    let customer = app.seed_customer().await;
    let stranger = app.seed_customer().await;
    let product = app.seed_product("Corn", dec!(10.00), None).await;

    let mine = app.place_order(customer, product, 1).await;
    let theirs = app.place_order(stranger, product, 1).await;
    let paid = app.place_order(customer, product, 1).await;
    app.core
        .payments
        .reconcile(paid.id, reported("success"))
        .await
        .unwrap();

    let err = app
        .core
        .payments
        .create_bundle_charge(&[], customer)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let err = app
        .core
        .payments
        .create_bundle_charge(&[mine.id, uuid::Uuid::new_v4()], customer)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let err = app
        .core
        .payments
        .create_bundle_charge(&[mine.id, theirs.id], customer)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let err = app
        .core
        .payments
        .create_bundle_charge(&[mine.id, paid.id], customer)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    // No precondition failure reached the gateway or touched the orders.
    assert_eq!(app.gateway.call_count(), 0);
    assert!(app.order_row(mine.id).await.gateway_order_id.is_none());
    assert!(app.order_row(theirs.id).await.gateway_order_id.is_none());
}

#[tokio::test]
async fn reconcile_normalizes_reported_statuses() {
    let app = TestCore::new().await;
    let customer = app.seed_customer().await;
    let product = app.seed_product("Beans", dec!(45.00), None).await;

    let success = app.place_order(customer, product, 1).await;
    let failed = app.place_order(customer, product, 1).await;
    let refunded = app.place_order(customer, product, 1).await;

    app.core
        .payments
        .reconcile(success.id, reported("success"))
        .await
        .unwrap();
    app.core
        .payments
        .reconcile(failed.id, reported("FAILED"))
        .await
        .unwrap();
    app.core
        .payments
        .reconcile(refunded.id, reported("refunded"))
        .await
        .unwrap();

    assert_eq!(app.order_row(success.id).await.payment_status, "PAID");
    assert_eq!(app.order_row(failed.id).await.payment_status, "FAILED");
    // Unknown statuses are carried verbatim, uppercased.
    assert_eq!(app.order_row(refunded.id).await.payment_status, "REFUNDED");

    let row = app.order_row(success.id).await;
    assert_eq!(row.gateway_payment_id.as_deref(), Some("pay_123"));
    assert_eq!(row.gateway_signature.as_deref(), Some("sig_abc"));
}

#[tokio::test]
async fn reconcile_is_idempotent_but_never_unpays() {
    let app = TestCore::new().await;
    let customer = app.seed_customer().await;
    let product = app.seed_product("Rice", dec!(60.00), None).await;
    let placed = app.place_order(customer, product, 1).await;

    app.core
        .payments
        .reconcile(placed.id, reported("success"))
        .await
        .unwrap();

    // Replaying the same outcome is harmless.
    app.core
        .payments
        .reconcile(placed.id, reported("PAID"))
        .await
        .unwrap();
    assert_eq!(app.order_row(placed.id).await.payment_status, "PAID");

    // But no report may move a paid order away from PAID.
    for regress in ["failed", "refunded", "pending"] {
        let err = app
            .core
            .payments
            .reconcile(placed.id, reported(regress))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }
    assert_eq!(app.order_row(placed.id).await.payment_status, "PAID");
}

#[tokio::test]
async fn reconcile_missing_order_is_not_found() {
    let app = TestCore::new().await;

    let err = app
        .core
        .payments
        .reconcile(uuid::Uuid::new_v4(), reported("success"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn reconcile_bundle_applies_one_outcome_to_every_order() {
    let app = TestCore::new().await;
    let customer = app.seed_customer().await;
    let product = app.seed_product("Millet", dec!(100.00), None).await;

    let first = app.place_order(customer, product, 1).await;
    let second = app.place_order(customer, product, 2).await;
    app.core
        .payments
        .create_bundle_charge(&[first.id, second.id], customer)
        .await
        .unwrap();

    let views = app
        .core
        .payments
        .reconcile_bundle(&[first.id, second.id], customer, reported("success"))
        .await
        .unwrap();

    assert_eq!(views.len(), 2);
    for id in [first.id, second.id] {
        let row = app.order_row(id).await;
        assert_eq!(row.payment_status, "PAID");
        assert_eq!(row.gateway_payment_id.as_deref(), Some("pay_123"));
    }
}

#[tokio::test]
async fn reconcile_bundle_rechecks_ownership_before_writing() {
    let app = TestCore::new().await;
    let customer = app.seed_customer().await;
    let stranger = app.seed_customer().await;
    let product = app.seed_product("Barley", dec!(55.00), None).await;

    let mine = app.place_order(customer, product, 1).await;
    let theirs = app.place_order(stranger, product, 1).await;

    let err = app
        .core
        .payments
        .reconcile_bundle(&[mine.id, theirs.id], customer, reported("success"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    // Fail-fast: neither order changed.
    assert_eq!(app.order_row(mine.id).await.payment_status, "PENDING");
    assert_eq!(app.order_row(theirs.id).await.payment_status, "PENDING");
}
