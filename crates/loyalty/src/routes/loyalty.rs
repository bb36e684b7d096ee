//! Loyalty API route handlers and the customer session extractor.
//!
//! Authentication is resolved upstream by the storefront's OAuth flow;
//! this service only reads the resulting session cookies. A request is
//! authenticated when both `customer_access_token` and `customer_id`
//! cookies are present — the token is never validated here, only its
//! presence gates access, matching the storefront's session contract.

use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{header::COOKIE, request::Parts},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use momiji_core::{VoucherLevel, available_vouchers, next_voucher_level};

use crate::error::{AppError, Result};
use crate::state::AppState;

const ACCESS_TOKEN_COOKIE: &str = "customer_access_token";
const CUSTOMER_ID_COOKIE: &str = "customer_id";

/// Extractor for the storefront-authenticated customer.
pub struct CustomerSession {
    pub customer_id: String,
}

impl<S> FromRequestParts<S> for CustomerSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let cookies = parts
            .headers
            .get(COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if cookie_value(cookies, ACCESS_TOKEN_COOKIE).is_none() {
            return Err(AppError::Unauthorized("Not authenticated".to_string()));
        }

        let customer_id = cookie_value(cookies, CUSTOMER_ID_COOKIE).ok_or_else(|| {
            AppError::Unauthorized("Customer ID not found in session".to_string())
        })?;

        Ok(Self {
            customer_id: customer_id.to_string(),
        })
    }
}

/// Find a cookie's value in a `Cookie` header string.
fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then_some(value)
    })
}

/// Response for `GET /api/loyalty/points`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsResponse {
    pub points: u64,
    pub available_vouchers: Vec<&'static VoucherLevel>,
    pub next_level: Option<&'static VoucherLevel>,
}

/// Get the authenticated customer's balance and redemption options.
#[instrument(skip(state, session), fields(customer_id = %session.customer_id))]
pub async fn points(
    session: CustomerSession,
    State(state): State<AppState>,
) -> Json<PointsResponse> {
    let points = state.ledger().balance(&session.customer_id).await;

    Json(PointsResponse {
        points,
        available_vouchers: available_vouchers(points),
        next_level: next_voucher_level(points),
    })
}

/// Request body for `POST /api/loyalty/redeem`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub voucher_points: u64,
}

/// Response for a successful redemption.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub success: bool,
    pub discount_code: String,
    pub points_redeemed: u64,
    pub discount_value: u64,
    pub new_balance: u64,
}

/// Redeem points for a discount voucher.
#[instrument(skip(state, session), fields(customer_id = %session.customer_id))]
pub async fn redeem(
    session: CustomerSession,
    State(state): State<AppState>,
    Json(body): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>> {
    let redemption = state
        .ledger()
        .redeem(&session.customer_id, body.voucher_points)
        .await?;

    Ok(Json(RedeemResponse {
        success: true,
        discount_code: redemption.code,
        points_redeemed: redemption.points_redeemed,
        discount_value: redemption.discount_value,
        new_balance: redemption.new_balance,
    }))
}
