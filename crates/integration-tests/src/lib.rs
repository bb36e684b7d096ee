//! Integration test harness for the Momiji loyalty service.
//!
//! Spins up two in-process servers per test:
//!
//! 1. a mock of the Shopify Admin GraphQL endpoint backed by an in-memory
//!    metafield store, and
//! 2. the real loyalty router, wired to the mock through
//!    `AdminClient::with_endpoint`.
//!
//! Tests then drive the loyalty service over HTTP exactly as the
//! storefront and Shopify's webhook delivery would.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, extract::State, http::HeaderMap, http::StatusCode, routing::post};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::{Value, json};
use sha2::Sha256;
use tokio::sync::Mutex;

use momiji_loyalty::config::{LoyaltyConfig, ShopifyAdminConfig};
use momiji_loyalty::routes;
use momiji_loyalty::shopify::AdminClient;
use momiji_loyalty::state::AppState;

pub const ACCESS_TOKEN: &str = "shpat_integration_test";
pub const WEBHOOK_SECRET: &str = "whsec_integration_test";

/// A discount created through the mock `discountCodeBasicCreate`.
#[derive(Debug, Clone)]
pub struct IssuedDiscount {
    pub code: String,
    pub title: String,
    pub customer_gid: String,
    pub amount: String,
    pub applies_once_per_customer: bool,
    pub usage_limit: i64,
    pub starts_at: String,
    pub ends_at: String,
}

/// In-memory stand-in for Shopify's metafield store and discount service.
#[derive(Debug, Default)]
pub struct MockShopify {
    /// customer GID -> points metafield value
    pub customer_points: HashMap<String, String>,
    /// order GID -> award metafield value (JSON string)
    pub order_awards: HashMap<String, String>,
    pub issued_discounts: Vec<IssuedDiscount>,
    /// Total GraphQL requests received.
    pub request_count: usize,
    /// Respond 500 to all queries (reads should fail open).
    pub fail_reads: bool,
    /// Return user errors from `customerUpdate` (writes must fail loud).
    pub fail_customer_update: bool,
    /// Return user errors from `discountCodeBasicCreate`.
    pub fail_discount_create: bool,
}

pub type SharedMock = Arc<Mutex<MockShopify>>;

/// A running loyalty service wired to a mock Shopify endpoint.
pub struct TestContext {
    pub client: reqwest::Client,
    pub base_url: String,
    pub mock: SharedMock,
}

impl TestContext {
    /// Start a context with default configuration.
    pub async fn new() -> Self {
        Self::start(false).await
    }

    /// Start a context with `LOYALTY_MARK_GUEST_ORDERS` enabled.
    pub async fn with_mark_guest_orders() -> Self {
        Self::start(true).await
    }

    async fn start(mark_guest_orders: bool) -> Self {
        let mock: SharedMock = Arc::new(Mutex::new(MockShopify::default()));
        let shopify_addr = spawn_server(mock_router(Arc::clone(&mock))).await;

        let config = LoyaltyConfig {
            host: "127.0.0.1".parse().expect("addr"),
            port: 0,
            mark_guest_orders,
            shopify: ShopifyAdminConfig {
                store: "mock.myshopify.test".to_string(),
                api_version: "2025-01".to_string(),
                access_token: SecretString::from(ACCESS_TOKEN),
            },
            webhook_secret: SecretString::from(WEBHOOK_SECRET),
            sentry_dsn: None,
            sentry_environment: None,
        };

        let admin = AdminClient::with_endpoint(
            format!("http://{shopify_addr}/graphql"),
            SecretString::from(ACCESS_TOKEN),
        )
        .expect("admin client");

        let state = AppState::with_admin_client(config, admin);
        let app_addr = spawn_server(routes::router(state)).await;

        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{app_addr}"),
            mock,
        }
    }

    /// Seed a customer's points balance in the mock store.
    pub async fn set_points(&self, customer_id: &str, points: u64) {
        self.mock.lock().await.customer_points.insert(
            format!("gid://shopify/Customer/{customer_id}"),
            points.to_string(),
        );
    }

    /// Read a customer's points balance straight from the mock store.
    pub async fn points_of(&self, customer_id: &str) -> u64 {
        self.mock
            .lock()
            .await
            .customer_points
            .get(&format!("gid://shopify/Customer/{customer_id}"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Read an order's award record straight from the mock store.
    pub async fn award_record_of(&self, order_id: &str) -> Option<Value> {
        self.mock
            .lock()
            .await
            .order_awards
            .get(&format!("gid://shopify/Order/{order_id}"))
            .and_then(|v| serde_json::from_str(v).ok())
    }

    /// GET a loyalty API path with storefront session cookies.
    pub async fn get_as_customer(&self, path: &str, customer_id: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.base_url))
            .header(
                "Cookie",
                format!("customer_access_token=tok; customer_id={customer_id}"),
            )
            .send()
            .await
            .expect("request")
    }

    /// POST a JSON body to a loyalty API path with session cookies.
    pub async fn post_as_customer(
        &self,
        path: &str,
        customer_id: &str,
        body: &Value,
    ) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.base_url))
            .header(
                "Cookie",
                format!("customer_access_token=tok; customer_id={customer_id}"),
            )
            .json(body)
            .send()
            .await
            .expect("request")
    }

    /// POST a correctly signed webhook delivery.
    pub async fn post_webhook(&self, path: &str, body: &str) -> reqwest::Response {
        self.post_webhook_signed(path, body, &sign_webhook(WEBHOOK_SECRET, body.as_bytes()))
            .await
    }

    /// POST a webhook delivery with an explicit signature header value.
    pub async fn post_webhook_signed(
        &self,
        path: &str,
        body: &str,
        signature: &str,
    ) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.base_url))
            .header("X-Shopify-Hmac-Sha256", signature)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("request")
    }
}

/// Compute Shopify's webhook signature for a body.
pub fn sign_webhook(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("key length");
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Build an order-paid webhook body.
pub fn order_paid_body(
    order_id: i64,
    customer_id: Option<i64>,
    subtotal: &str,
    currency: &str,
) -> String {
    json!({
        "id": order_id,
        "customer": customer_id.map(|id| json!({ "id": id })),
        "total_price": subtotal,
        "subtotal_price": subtotal,
        "total_tax": "0.00",
        "currency": currency,
        "financial_status": "paid",
        "line_items": [],
    })
    .to_string()
}

/// Build a refund-created webhook body.
pub fn refund_created_body(
    refund_id: i64,
    order_id: i64,
    customer_id: Option<i64>,
    line_item_subtotals: &[f64],
    currency: &str,
) -> String {
    json!({
        "id": refund_id,
        "order_id": order_id,
        "refund_line_items": line_item_subtotals
            .iter()
            .map(|s| json!({ "subtotal": s }))
            .collect::<Vec<_>>(),
        "order": {
            "id": order_id,
            "customer": customer_id.map(|id| json!({ "id": id })),
            "currency": currency,
        },
    })
    .to_string()
}

async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    addr
}

// =============================================================================
// Mock Shopify Admin GraphQL endpoint
// =============================================================================

fn mock_router(mock: SharedMock) -> Router {
    Router::new()
        .route("/graphql", post(handle_graphql))
        .with_state(mock)
}

async fn handle_graphql(
    State(mock): State<SharedMock>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if headers
        .get("X-Shopify-Access-Token")
        .and_then(|v| v.to_str().ok())
        != Some(ACCESS_TOKEN)
    {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }

    let mut state = mock.lock().await;
    state.request_count += 1;

    let query = request["query"].as_str().unwrap_or_default();
    let variables = &request["variables"];

    if query.contains("query CustomerMetafield") || query.contains("query OrderMetafield") {
        if state.fail_reads {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
        }
        return metafield_response(&state, query, variables);
    }

    if query.contains("SetCustomerMetafields") {
        if state.fail_customer_update {
            return ok(json!({
                "customerUpdate": {
                    "customer": null,
                    "userErrors": [
                        { "field": ["input", "metafields"], "message": "value is invalid" }
                    ]
                }
            }));
        }
        let gid = variables["input"]["id"].as_str().unwrap_or_default().to_string();
        let value = variables["input"]["metafields"][0]["value"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        state.customer_points.insert(gid.clone(), value);
        return ok(json!({
            "customerUpdate": { "customer": { "id": gid }, "userErrors": [] }
        }));
    }

    if query.contains("SetOrderMetafields") {
        let gid = variables["input"]["id"].as_str().unwrap_or_default().to_string();
        let value = variables["input"]["metafields"][0]["value"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        state.order_awards.insert(gid.clone(), value);
        return ok(json!({
            "orderUpdate": { "order": { "id": gid }, "userErrors": [] }
        }));
    }

    if query.contains("discountCodeBasicCreate") {
        if state.fail_discount_create {
            return ok(json!({
                "discountCodeBasicCreate": {
                    "codeDiscountNode": null,
                    "userErrors": [
                        { "field": ["basicCodeDiscount"], "message": "creation rejected" }
                    ]
                }
            }));
        }
        let input = &variables["input"];
        let code = input["code"].as_str().unwrap_or_default().to_string();
        state.issued_discounts.push(IssuedDiscount {
            code: code.clone(),
            title: input["title"].as_str().unwrap_or_default().to_string(),
            customer_gid: input["customerSelection"]["customers"]["add"][0]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            amount: input["customerGets"]["value"]["discountAmount"]["amount"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            applies_once_per_customer: input["appliesOncePerCustomer"].as_bool().unwrap_or(false),
            usage_limit: input["usageLimit"].as_i64().unwrap_or(0),
            starts_at: input["startsAt"].as_str().unwrap_or_default().to_string(),
            ends_at: input["endsAt"].as_str().unwrap_or_default().to_string(),
        });
        return ok(json!({
            "discountCodeBasicCreate": {
                "codeDiscountNode": {
                    "id": "gid://shopify/DiscountCodeNode/1",
                    "codeDiscount": {
                        "title": input["title"],
                        "codes": { "edges": [ { "node": { "code": code } } ] }
                    }
                },
                "userErrors": []
            }
        }));
    }

    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "errors": [ { "message": "unrecognized query" } ] })),
    )
}

fn metafield_response(
    state: &MockShopify,
    query: &str,
    variables: &Value,
) -> (StatusCode, Json<Value>) {
    let gid = variables["id"].as_str().unwrap_or_default();
    let (root, stored) = if query.contains("query CustomerMetafield") {
        ("customer", state.customer_points.get(gid))
    } else {
        ("order", state.order_awards.get(gid))
    };

    let metafield = stored.map_or(Value::Null, |value| json!({ "value": value }));
    ok(json!({ root: { "id": gid, "metafield": metafield } }))
}

fn ok(data: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "data": data })))
}
