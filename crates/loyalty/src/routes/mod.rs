//! HTTP route handlers for the loyalty service.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                    - Health check
//!
//! # Loyalty API (storefront-session authenticated)
//! GET  /api/loyalty/points        - Balance, unlocked vouchers, next tier
//! POST /api/loyalty/redeem        - Redeem a voucher tier for a code
//!
//! # Shopify webhooks (HMAC-SHA256 verified)
//! POST /webhooks/orders/paid      - Award points for a paid order
//! POST /webhooks/refunds/create   - Reverse points for a refund
//! ```

pub mod loyalty;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/loyalty/points", get(loyalty::points))
        .route("/api/loyalty/redeem", post(loyalty::redeem))
        .route("/webhooks/orders/paid", post(webhooks::orders_paid))
        .route("/webhooks/refunds/create", post(webhooks::refunds_create))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check Shopify
/// reachability.
async fn health() -> &'static str {
    "ok"
}
