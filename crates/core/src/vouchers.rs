//! Voucher redemption catalog.
//!
//! The catalog is a fixed, compile-time table ordered ascending by points
//! required. Customers redeem an exact tier — there are no partial or
//! custom redemptions.

use serde::Serialize;

/// One entry in the points-to-discount redemption table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoucherLevel {
    /// Points consumed by redeeming this tier.
    pub points: u64,
    /// Fixed discount value in JPY.
    pub value: u64,
    /// Customer-facing label.
    pub label: &'static str,
}

/// Redemption tiers, ascending by points required.
///
/// Higher tiers deliberately return more value per point to reward saving.
pub const VOUCHER_LEVELS: &[VoucherLevel] = &[
    VoucherLevel { points: 500, value: 500, label: "¥500 OFF" },
    VoucherLevel { points: 1000, value: 1200, label: "¥1200 OFF" },
    VoucherLevel { points: 2000, value: 2500, label: "¥2500 OFF" },
    VoucherLevel { points: 5000, value: 6500, label: "¥6500 OFF" },
];

/// All tiers a balance can currently redeem, ascending.
#[must_use]
pub fn available_vouchers(points: u64) -> Vec<&'static VoucherLevel> {
    VOUCHER_LEVELS
        .iter()
        .filter(|level| points >= level.points)
        .collect()
}

/// The next tier a balance is working towards, or `None` once every tier
/// is unlocked.
#[must_use]
pub fn next_voucher_level(points: u64) -> Option<&'static VoucherLevel> {
    VOUCHER_LEVELS.iter().find(|level| points < level.points)
}

/// Exact tier lookup by points required, used to validate redemption
/// requests.
#[must_use]
pub fn voucher_level(points_required: u64) -> Option<&'static VoucherLevel> {
    VOUCHER_LEVELS
        .iter()
        .find(|level| level.points == points_required)
}
