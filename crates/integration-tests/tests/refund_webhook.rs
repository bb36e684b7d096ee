//! Tests for the refund-created webhook: reversals and duplicate delivery.

use momiji_integration_tests::{TestContext, order_paid_body, refund_created_body};
use serde_json::Value;

/// Award 12000 points to customer 42 for order 5001.
async fn award_order(ctx: &TestContext) {
    let body = order_paid_body(5001, Some(42), "12000.00", "JPY");
    let response = ctx.post_webhook("/webhooks/orders/paid", &body).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn partial_refund_subtracts_proportional_points() {
    let ctx = TestContext::new().await;
    award_order(&ctx).await;

    let body = refund_created_body(901, 5001, Some(42), &[6000.0], "JPY");
    let response = ctx.post_webhook("/webhooks/refunds/create", &body).await;
    assert_eq!(response.status(), 200);

    let json: Value = response.json().await.expect("json body");
    assert_eq!(json["success"], true);
    assert_eq!(json["pointsSubtracted"], 6000);
    assert_eq!(json["newBalance"], 6000);

    assert_eq!(ctx.points_of("42").await, 6000);

    let record = ctx.award_record_of("5001").await.expect("award record");
    assert_eq!(record["reversed_refund_ids"], serde_json::json!(["901"]));
}

#[tokio::test]
async fn duplicate_delivery_subtracts_exactly_once() {
    let ctx = TestContext::new().await;
    award_order(&ctx).await;

    let body = refund_created_body(901, 5001, Some(42), &[6000.0], "JPY");
    ctx.post_webhook("/webhooks/refunds/create", &body).await;
    let replay = ctx.post_webhook("/webhooks/refunds/create", &body).await;

    assert_eq!(replay.status(), 200);
    let json: Value = replay.json().await.expect("json body");
    assert_eq!(json["message"], "Refund already processed");

    assert_eq!(ctx.points_of("42").await, 6000);
}

#[tokio::test]
async fn distinct_refunds_each_subtract() {
    let ctx = TestContext::new().await;
    award_order(&ctx).await;

    let first = refund_created_body(901, 5001, Some(42), &[4000.0], "JPY");
    let second = refund_created_body(902, 5001, Some(42), &[2000.0, 1000.0], "JPY");
    ctx.post_webhook("/webhooks/refunds/create", &first).await;
    let response = ctx.post_webhook("/webhooks/refunds/create", &second).await;

    let json: Value = response.json().await.expect("json body");
    assert_eq!(json["pointsSubtracted"], 3000);
    assert_eq!(ctx.points_of("42").await, 5000);

    let record = ctx.award_record_of("5001").await.expect("award record");
    assert_eq!(record["reversed_refund_ids"], serde_json::json!(["901", "902"]));
}

#[tokio::test]
async fn unawarded_order_is_a_no_op() {
    let ctx = TestContext::new().await;
    ctx.set_points("42", 500).await;

    let body = refund_created_body(901, 7777, Some(42), &[6000.0], "JPY");
    let response = ctx.post_webhook("/webhooks/refunds/create", &body).await;

    assert_eq!(response.status(), 200);
    let json: Value = response.json().await.expect("json body");
    assert_eq!(json["message"], "No points were awarded for this order");
    assert_eq!(ctx.points_of("42").await, 500);
}

#[tokio::test]
async fn reversal_clamps_at_zero_balance() {
    let ctx = TestContext::new().await;
    award_order(&ctx).await;

    // Redeem away most of the balance, then refund the whole order.
    ctx.set_points("42", 100).await;

    let body = refund_created_body(901, 5001, Some(42), &[12000.0], "JPY");
    let response = ctx.post_webhook("/webhooks/refunds/create", &body).await;

    let json: Value = response.json().await.expect("json body");
    assert_eq!(json["success"], true);
    assert_eq!(json["newBalance"], 0);
    assert_eq!(ctx.points_of("42").await, 0);
}

#[tokio::test]
async fn refund_without_customer_is_skipped() {
    let ctx = TestContext::new().await;

    let body = refund_created_body(901, 5001, None, &[6000.0], "JPY");
    let response = ctx.post_webhook("/webhooks/refunds/create", &body).await;

    assert_eq!(response.status(), 200);
    let json: Value = response.json().await.expect("json body");
    assert_eq!(json["message"], "No customer attached to order");
    assert_eq!(ctx.mock.lock().await.request_count, 0);
}

#[tokio::test]
async fn invalid_signature_is_rejected() {
    let ctx = TestContext::new().await;

    let body = refund_created_body(901, 5001, Some(42), &[6000.0], "JPY");
    let response = ctx
        .post_webhook_signed("/webhooks/refunds/create", &body, "bm90IGEgcmVhbCBzaWduYXR1cmU=")
        .await;

    assert_eq!(response.status(), 401);
    assert_eq!(ctx.mock.lock().await.request_count, 0);
}
