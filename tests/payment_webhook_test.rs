//! Split-settlement reconciliation: session creation, webhook merges,
//! idempotent replays, refunds, and handler-level signature checks.

mod common;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use tower::ServiceExt;

use dineline_api::{
    entities::{order, settlement_event},
    errors::ServiceError,
    router,
    services::payments::{
        sign_webhook_payload, InitiatePaymentRequest, RefundRequest, WebhookEnvelope,
        PAYMENT_SUCCESS_WEBHOOK, SETTLEMENT_PROCESSED,
    },
};

async fn initiate(app: &TestApp, order_id: i64, restaurant_id: i64, amount: rust_decimal::Decimal) {
    app.state
        .services
        .payments
        .initiate_payment(InitiatePaymentRequest {
            order_id,
            restaurant_id,
            amount,
            customer_phone: "+919900000003".to_string(),
            customer_name: Some("Asha".to_string()),
            customer_email: None,
        })
        .await
        .expect("initiate payment");
}

async fn reload(app: &TestApp, order_id: i64) -> order::Model {
    order::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap()
}

fn success_envelope(gateway_order_id: &str, payment_id: &str) -> WebhookEnvelope {
    serde_json::from_value(json!({
        "type": "PAYMENT_SUCCESS_WEBHOOK",
        "data": {
            "order": {"order_id": gateway_order_id},
            "payment": {"cf_payment_id": payment_id, "payment_group": "upi"},
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn initiate_payment_splits_commission_and_stores_correlation() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("pay-init", dec!(0)).await;
    let order = app
        .seed_order(restaurant.id, "preparing", "pending", "upi", dec!(262.50))
        .await;

    let session = app
        .state
        .services
        .payments
        .initiate_payment(InitiatePaymentRequest {
            order_id: order.id,
            restaurant_id: restaurant.id,
            amount: dec!(262.50),
            customer_phone: "+919900000003".to_string(),
            customer_name: None,
            customer_email: None,
        })
        .await
        .expect("initiate");

    assert_eq!(session.platform_commission, dec!(2.63));
    assert_eq!(session.vendor_amount, dec!(259.87));
    assert!(session.session_id.starts_with("session_CF_ORD_"));

    // The vendor was provisioned lazily with the deterministic id and the
    // split leg routes the vendor amount.
    let sent = app.gateway.orders.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].splits.len(), 1);
    assert_eq!(sent[0].splits[0].vendor_id, format!("VENDOR_{}", restaurant.id));
    assert_eq!(sent[0].splits[0].amount, dec!(259.87));
    drop(sent);

    let stored = reload(&app, order.id).await;
    let gateway_order_id = stored.gateway_order_id.expect("correlation stored");
    assert!(gateway_order_id.starts_with(&format!("CF_ORD_{}_", order.id)));
    assert_eq!(stored.transaction_id.as_deref(), Some(gateway_order_id.as_str()));
    assert_eq!(stored.payment_status, "pending");
}

#[tokio::test]
async fn vendor_already_known_to_gateway_is_adopted() {
    let app = TestApp::new().await;
    app.gateway
        .vendor_already_exists
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let restaurant = app.seed_restaurant("pay-vendor", dec!(0)).await;

    let vendor_id = app
        .state
        .services
        .payments
        .ensure_vendor(restaurant.id)
        .await
        .expect("ensure vendor");
    assert_eq!(vendor_id, format!("VENDOR_{}", restaurant.id));

    // Second call reuses the persisted id without another gateway trip.
    let again = app
        .state
        .services
        .payments
        .ensure_vendor(restaurant.id)
        .await
        .expect("reuse vendor");
    assert_eq!(again, vendor_id);
    assert_eq!(app.gateway.vendors.lock().await.len(), 1);
}

#[tokio::test]
async fn success_webhook_marks_order_paid_and_advances_pending() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("pay-success", dec!(0)).await;
    let order = app
        .seed_order(restaurant.id, "pending", "pending", "upi", dec!(500.00))
        .await;
    initiate(&app, order.id, restaurant.id, dec!(500.00)).await;

    let gateway_order_id = reload(&app, order.id).await.gateway_order_id.unwrap();
    let mutated = app
        .state
        .services
        .payments
        .handle_webhook(success_envelope(&gateway_order_id, "pay_991"))
        .await
        .expect("webhook");
    assert!(mutated.is_some());

    let stored = reload(&app, order.id).await;
    assert_eq!(stored.payment_status, "paid");
    assert_eq!(stored.status, "preparing");
    assert_eq!(stored.transaction_id.as_deref(), Some("pay_991"));
    assert_eq!(stored.payment_method, "upi");
}

#[tokio::test]
async fn success_webhook_replay_is_idempotent() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("pay-replay", dec!(0)).await;
    let order = app
        .seed_order(restaurant.id, "preparing", "pending", "upi", dec!(300.00))
        .await;
    initiate(&app, order.id, restaurant.id, dec!(300.00)).await;
    let gateway_order_id = reload(&app, order.id).await.gateway_order_id.unwrap();

    let envelope = success_envelope(&gateway_order_id, "pay_1");
    let first = app
        .state
        .services
        .payments
        .handle_webhook(envelope.clone())
        .await
        .expect("first delivery");
    assert!(first.is_some());

    let replay = app
        .state
        .services
        .payments
        .handle_webhook(envelope)
        .await
        .expect("replay");
    assert!(replay.is_none(), "replay must be a no-op");

    let stored = reload(&app, order.id).await;
    assert_eq!(stored.payment_status, "paid");
    assert_eq!(stored.transaction_id.as_deref(), Some("pay_1"));
}

#[tokio::test]
async fn success_webhook_never_rewinds_staff_progress() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("pay-forward", dec!(0)).await;
    let order = app
        .seed_order(restaurant.id, "served", "pending", "upi", dec!(300.00))
        .await;
    initiate(&app, order.id, restaurant.id, dec!(300.00)).await;
    let gateway_order_id = reload(&app, order.id).await.gateway_order_id.unwrap();

    app.state
        .services
        .payments
        .handle_webhook(success_envelope(&gateway_order_id, "pay_2"))
        .await
        .expect("webhook");

    let stored = reload(&app, order.id).await;
    assert_eq!(stored.payment_status, "paid");
    // Forward-only: the order stays served, it is not pulled back to preparing.
    assert_eq!(stored.status, "served");
}

#[tokio::test]
async fn late_failure_webhook_does_not_downgrade_a_paid_order() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("pay-late-fail", dec!(0)).await;
    let order = app
        .seed_order(restaurant.id, "preparing", "pending", "upi", dec!(300.00))
        .await;
    initiate(&app, order.id, restaurant.id, dec!(300.00)).await;
    let gateway_order_id = reload(&app, order.id).await.gateway_order_id.unwrap();

    app.state
        .services
        .payments
        .handle_webhook(success_envelope(&gateway_order_id, "pay_3"))
        .await
        .expect("success");

    let failure: WebhookEnvelope = serde_json::from_value(json!({
        "type": "PAYMENT_FAILED_WEBHOOK",
        "data": {"order": {"order_id": gateway_order_id}},
    }))
    .unwrap();
    let mutated = app
        .state
        .services
        .payments
        .handle_webhook(failure)
        .await
        .expect("failure webhook");
    assert!(mutated.is_none());

    assert_eq!(reload(&app, order.id).await.payment_status, "paid");
}

#[tokio::test]
async fn webhook_for_unknown_session_is_ignored() {
    let app = TestApp::new().await;
    let mutated = app
        .state
        .services
        .payments
        .handle_webhook(success_envelope("CF_ORD_424242_1699999999", "pay_x"))
        .await
        .expect("unknown session");
    assert!(mutated.is_none());
}

#[tokio::test]
async fn settlement_webhook_is_recorded_without_touching_orders() {
    let app = TestApp::new().await;
    let envelope: WebhookEnvelope = serde_json::from_value(json!({
        "type": "SETTLEMENT_PROCESSED",
        "data": {
            "vendor_id": "VENDOR_1",
            "settlement_id": "settle_77",
            "amount": "1234.56",
        }
    }))
    .unwrap();
    assert_eq!(envelope.event_type, SETTLEMENT_PROCESSED);

    let mutated = app
        .state
        .services
        .payments
        .handle_webhook(envelope)
        .await
        .expect("settlement webhook");
    assert!(mutated.is_none());

    let recorded = settlement_event::Entity::find()
        .filter(settlement_event::Column::VendorId.eq("VENDOR_1"))
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("settlement event persisted");
    assert_eq!(recorded.settlement_id.as_deref(), Some("settle_77"));
    assert_eq!(recorded.amount, Some(dec!(1234.56)));
}

#[tokio::test]
async fn refund_requires_settled_payment() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("refund-unpaid", dec!(0)).await;
    let order = app
        .seed_order(restaurant.id, "preparing", "pending", "upi", dec!(300.00))
        .await;

    let err = app
        .state
        .services
        .payments
        .refund(RefundRequest {
            order_id: order.id,
            amount: dec!(300.00),
            reason: None,
        })
        .await
        .unwrap_err();
    match err {
        ServiceError::ValidationError(msg) => {
            assert!(msg.contains("payment is not completed"), "{msg}")
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn refund_of_paid_order_uses_stored_transaction_id() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("refund-paid", dec!(0)).await;
    let order = app
        .seed_order(restaurant.id, "preparing", "pending", "upi", dec!(300.00))
        .await;
    initiate(&app, order.id, restaurant.id, dec!(300.00)).await;
    let gateway_order_id = reload(&app, order.id).await.gateway_order_id.unwrap();
    app.state
        .services
        .payments
        .handle_webhook(success_envelope(&gateway_order_id, "pay_refund_me"))
        .await
        .expect("success webhook");

    let refund = app
        .state
        .services
        .payments
        .refund(RefundRequest {
            order_id: order.id,
            amount: dec!(300.00),
            reason: Some("table complaint".to_string()),
        })
        .await
        .expect("refund");
    assert_eq!(refund.refund_id, "refund_pay_refund_me");

    let calls = app.gateway.refunds.lock().await;
    assert_eq!(calls.as_slice(), &[("pay_refund_me".to_string(), dec!(300.00))]);
    drop(calls);

    assert_eq!(reload(&app, order.id).await.payment_status, "refunded");
}

#[tokio::test]
async fn gateway_failure_surfaces_and_leaves_order_untouched() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant("pay-gw-fail", dec!(0)).await;
    let order = app
        .seed_order(restaurant.id, "preparing", "pending", "upi", dec!(300.00))
        .await;
    app.gateway
        .fail_next_order
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let err = app
        .state
        .services
        .payments
        .initiate_payment(InitiatePaymentRequest {
            order_id: order.id,
            restaurant_id: restaurant.id,
            amount: dec!(300.00),
            customer_phone: "+919900000003".to_string(),
            customer_name: None,
            customer_email: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::GatewayError(_));

    let stored = reload(&app, order.id).await;
    assert!(stored.gateway_order_id.is_none());
}

// ==================== Handler-level signature checks ====================

async fn post_webhook(app: &TestApp, body: &str, headers: &[(&str, &str)]) -> StatusCode {
    let mut request = Request::builder()
        .method(Method::POST)
        .uri("/payment/webhook")
        .header("content-type", "application/json");
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = router(app.state.clone())
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    response.status()
}

#[tokio::test]
async fn webhook_handler_rejects_bad_signatures() {
    let app = TestApp::new().await;
    let body = json!({"type": PAYMENT_SUCCESS_WEBHOOK, "data": {}}).to_string();

    let status = post_webhook(
        &app,
        &body,
        &[
            ("x-webhook-timestamp", "1699999999"),
            ("x-webhook-signature", "bogus"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let status = post_webhook(&app, &body, &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_handler_accepts_signed_payloads_even_for_unknown_orders() {
    let app = TestApp::new().await;
    let body = json!({
        "type": PAYMENT_SUCCESS_WEBHOOK,
        "data": {"order": {"order_id": "CF_ORD_55_1"}, "payment": {"cf_payment_id": "p"}},
    })
    .to_string();
    let timestamp = "1699999999";
    let signature = sign_webhook_payload("test-webhook-secret", timestamp, body.as_bytes());

    let status = post_webhook(
        &app,
        &body,
        &[
            ("x-webhook-timestamp", timestamp),
            ("x-webhook-signature", signature.as_str()),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn webhook_handler_answers_ok_for_unknown_event_types() {
    let app = TestApp::new().await;
    let body = json!({"type": "SOMETHING_NEW", "data": {}}).to_string();
    let timestamp = "1700000000";
    let signature = sign_webhook_payload("test-webhook-secret", timestamp, body.as_bytes());

    let status = post_webhook(
        &app,
        &body,
        &[
            ("x-webhook-timestamp", timestamp),
            ("x-webhook-signature", signature.as_str()),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
