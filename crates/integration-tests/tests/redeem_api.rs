//! Tests for `POST /api/loyalty/redeem`.

use momiji_integration_tests::TestContext;
use serde_json::{Value, json};

#[tokio::test]
async fn insufficient_balance_is_rejected_with_amounts() {
    let ctx = TestContext::new().await;

    let response = ctx
        .post_as_customer("/api/loyalty/redeem", "42", &json!({ "voucherPoints": 500 }))
        .await;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["error"], "Insufficient points");
    assert_eq!(body["required"], 500);
    assert_eq!(body["available"], 0);
    assert!(ctx.mock.lock().await.issued_discounts.is_empty());
}

#[tokio::test]
async fn redeeming_a_tier_issues_a_code_and_deducts_points() {
    let ctx = TestContext::new().await;
    ctx.set_points("42", 1200).await;

    let response = ctx
        .post_as_customer("/api/loyalty/redeem", "42", &json!({ "voucherPoints": 1000 }))
        .await;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["success"], true);
    assert_eq!(body["pointsRedeemed"], 1000);
    assert_eq!(body["discountValue"], 1200);
    assert_eq!(body["newBalance"], 200);

    let code = body["discountCode"].as_str().expect("code");
    let (prefix, suffix) = code.split_once('-').expect("code has a suffix");
    assert_eq!(prefix, "LOYALTY1000");
    assert_eq!(suffix.len(), 8);

    assert_eq!(ctx.points_of("42").await, 200);

    let mock = ctx.mock.lock().await;
    let discount = &mock.issued_discounts[0];
    assert_eq!(discount.code, code);
    assert_eq!(discount.title, "Loyalty 1000 Points Redemption");
    assert_eq!(discount.customer_gid, "gid://shopify/Customer/42");
    assert_eq!(discount.amount, "1200");
    assert!(discount.applies_once_per_customer);
    assert_eq!(discount.usage_limit, 1);
}

#[tokio::test]
async fn off_catalog_tier_is_rejected() {
    let ctx = TestContext::new().await;
    ctx.set_points("42", 5000).await;

    let response = ctx
        .post_as_customer("/api/loyalty/redeem", "42", &json!({ "voucherPoints": 999 }))
        .await;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["error"], "Invalid voucher level");
    assert_eq!(ctx.points_of("42").await, 5000);
}

#[tokio::test]
async fn failed_issuance_leaves_the_balance_untouched() {
    let ctx = TestContext::new().await;
    ctx.set_points("42", 1200).await;
    ctx.mock.lock().await.fail_discount_create = true;

    let response = ctx
        .post_as_customer("/api/loyalty/redeem", "42", &json!({ "voucherPoints": 1000 }))
        .await;

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["error"], "External service error");

    assert_eq!(ctx.points_of("42").await, 1200);
    assert!(ctx.mock.lock().await.issued_discounts.is_empty());
}

#[tokio::test]
async fn failed_deduction_after_issuance_surfaces_as_502() {
    let ctx = TestContext::new().await;
    ctx.set_points("42", 1200).await;
    ctx.mock.lock().await.fail_customer_update = true;

    let response = ctx
        .post_as_customer("/api/loyalty/redeem", "42", &json!({ "voucherPoints": 1000 }))
        .await;

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["error"], "External service error");

    // The voucher is issued before the deduction, so this failure mode
    // costs the shop a code but never the customer's points.
    assert_eq!(ctx.points_of("42").await, 1200);
    assert_eq!(ctx.mock.lock().await.issued_discounts.len(), 1);
}

#[tokio::test]
async fn concurrent_redemptions_cannot_double_spend() {
    let ctx = TestContext::new().await;
    ctx.set_points("42", 1000).await;

    let body = json!({ "voucherPoints": 1000 });
    let (first, second) = tokio::join!(
        ctx.post_as_customer("/api/loyalty/redeem", "42", &body),
        ctx.post_as_customer("/api/loyalty/redeem", "42", &body),
    );

    let statuses = [first.status().as_u16(), second.status().as_u16()];
    assert!(
        statuses.contains(&200) && statuses.contains(&400),
        "expected one success and one rejection, got {statuses:?}"
    );

    assert_eq!(ctx.points_of("42").await, 0);
    assert_eq!(ctx.mock.lock().await.issued_discounts.len(), 1);
}

#[tokio::test]
async fn requires_session_cookies() {
    let ctx = TestContext::new().await;

    let response = ctx
        .client
        .post(format!("{}/api/loyalty/redeem", ctx.base_url))
        .json(&json!({ "voucherPoints": 500 }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 401);
}
