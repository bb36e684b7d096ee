//! Points calculation from order amounts.
//!
//! Points are only ever earned in the shop's settlement currency (JPY).
//! Orders priced in any other currency earn nothing, which sidesteps FX
//! ambiguity entirely rather than converting at some arbitrary rate.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Points awarded per ¥1 of order subtotal (excluding tax and shipping).
pub const POINTS_PER_YEN: u64 = 1;

/// The only currency that earns points.
pub const SETTLEMENT_CURRENCY: &str = "JPY";

/// Calculate the points earned for a monetary amount.
///
/// Returns `floor(amount * POINTS_PER_YEN)` for JPY amounts and 0 for any
/// other currency. Negative or unrepresentable amounts yield 0 rather than
/// an error: the input comes from trusted order data, and a malformed
/// subtotal must never abort order processing.
#[must_use]
pub fn points_for_amount(amount: Decimal, currency_code: &str) -> u64 {
    if currency_code != SETTLEMENT_CURRENCY {
        return 0;
    }

    (amount * Decimal::from(POINTS_PER_YEN))
        .floor()
        .to_u64()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().expect("valid decimal literal")
    }

    #[test]
    fn jpy_subtotal_earns_one_point_per_yen() {
        assert_eq!(points_for_amount(dec("12000"), "JPY"), 12000);
        assert_eq!(points_for_amount(dec("1"), "JPY"), 1);
        assert_eq!(points_for_amount(dec("0"), "JPY"), 0);
    }

    #[test]
    fn fractional_amounts_floor() {
        assert_eq!(points_for_amount(dec("999.99"), "JPY"), 999);
        assert_eq!(points_for_amount(dec("0.5"), "JPY"), 0);
    }

    #[test]
    fn non_jpy_currency_earns_nothing() {
        assert_eq!(points_for_amount(dec("12000"), "USD"), 0);
        assert_eq!(points_for_amount(dec("12000"), "EUR"), 0);
        assert_eq!(points_for_amount(dec("12000"), "jpy"), 0);
    }

    #[test]
    fn negative_amounts_earn_nothing() {
        assert_eq!(points_for_amount(dec("-500"), "JPY"), 0);
    }
}
