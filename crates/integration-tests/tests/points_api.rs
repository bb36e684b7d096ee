//! Tests for `GET /api/loyalty/points`.

use momiji_integration_tests::TestContext;
use serde_json::Value;

#[tokio::test]
async fn requires_session_cookies() {
    let ctx = TestContext::new().await;

    let response = ctx
        .client
        .get(format!("{}/api/loyalty/points", ctx.base_url))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["error"], "Not authenticated");
}

#[tokio::test]
async fn requires_customer_id_cookie() {
    let ctx = TestContext::new().await;

    let response = ctx
        .client
        .get(format!("{}/api/loyalty/points", ctx.base_url))
        .header("Cookie", "customer_access_token=tok")
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["error"], "Customer ID not found in session");
}

#[tokio::test]
async fn returns_balance_with_unlocked_and_next_tiers() {
    let ctx = TestContext::new().await;
    ctx.set_points("42", 1200).await;

    let response = ctx.get_as_customer("/api/loyalty/points", "42").await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["points"], 1200);

    let available = body["availableVouchers"].as_array().expect("array");
    let unlocked: Vec<u64> = available
        .iter()
        .map(|level| level["points"].as_u64().expect("points"))
        .collect();
    assert_eq!(unlocked, vec![500, 1000]);

    assert_eq!(body["nextLevel"]["points"], 2000);
    assert_eq!(body["nextLevel"]["value"], 2500);
}

#[tokio::test]
async fn unknown_customer_reads_as_zero_balance() {
    let ctx = TestContext::new().await;

    let response = ctx.get_as_customer("/api/loyalty/points", "999").await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["points"], 0);
    assert!(body["availableVouchers"].as_array().expect("array").is_empty());
    assert_eq!(body["nextLevel"]["points"], 500);
}

#[tokio::test]
async fn balance_read_fails_open_to_zero() {
    let ctx = TestContext::new().await;
    ctx.set_points("42", 5000).await;
    ctx.mock.lock().await.fail_reads = true;

    let response = ctx.get_as_customer("/api/loyalty/points", "42").await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["points"], 0);
}
