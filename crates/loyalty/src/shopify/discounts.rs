//! Voucher discount issuance via `discountCodeBasicCreate`.

use chrono::{Duration, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::{Value, json};
use tracing::instrument;

use momiji_core::VoucherLevel;
use momiji_core::gid::customer_gid;

use super::admin::collect_user_errors;
use super::{AdminClient, AdminError};

/// How long an issued voucher stays valid.
const VOUCHER_VALIDITY_DAYS: i64 = 90;
/// Random suffix length appended to generated codes.
const CODE_SUFFIX_LEN: usize = 8;

const DISCOUNT_CREATE_MUTATION: &str = r"
mutation CreateVoucherCode($input: DiscountCodeBasicCreateInput!) {
  discountCodeBasicCreate(basicCodeDiscount: $input) {
    codeDiscountNode {
      id
      codeDiscount {
        ... on DiscountCodeBasic {
          title
          codes(first: 1) {
            edges {
              node {
                code
              }
            }
          }
        }
      }
    }
    userErrors {
      field
      message
    }
  }
}
";

impl AdminClient {
    /// Issue a single-use, customer-scoped, fixed-amount voucher code.
    ///
    /// The discount is restricted to exactly the given customer, applies to
    /// all items once per customer, and is valid from issuance until
    /// issuance + 90 days. Returns the created code.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::UserError` on validation errors and
    /// `AdminError::MissingData` if Shopify returns no code; both must
    /// propagate so the caller never deducts points against a voucher that
    /// was not created.
    #[instrument(skip(self, level), fields(customer_id, tier_points = level.points))]
    pub async fn issue_voucher(
        &self,
        customer_id: &str,
        level: &VoucherLevel,
    ) -> Result<String, AdminError> {
        let gid = customer_gid(customer_id);
        let code = generate_voucher_code(level.points);
        let starts_at = Utc::now();
        let ends_at = starts_at + Duration::days(VOUCHER_VALIDITY_DAYS);

        let input = json!({
            "title": format!("Loyalty {} Points Redemption", level.points),
            "code": code,
            "startsAt": starts_at.to_rfc3339(),
            "endsAt": ends_at.to_rfc3339(),
            "customerSelection": {
                "customers": { "add": [gid] }
            },
            "customerGets": {
                "value": {
                    "discountAmount": {
                        "amount": level.value.to_string(),
                        "appliesOnEachItem": false
                    }
                },
                "items": { "all": true }
            },
            "appliesOncePerCustomer": true,
            "usageLimit": 1
        });

        let data = self.run(DISCOUNT_CREATE_MUTATION, json!({ "input": input })).await?;

        let payload = data
            .get("discountCodeBasicCreate")
            .ok_or(AdminError::MissingData("discountCodeBasicCreate"))?;

        if let Some(message) = collect_user_errors(payload) {
            return Err(AdminError::UserError(message));
        }

        payload
            .pointer("/codeDiscountNode/codeDiscount/codes/edges/0/node/code")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or(AdminError::MissingData("discount code"))
    }
}

/// Generate a voucher code embedding the tier and a random suffix.
///
/// The suffix comes from the thread-local CSPRNG rather than the wall
/// clock, so two redemptions in the same instant cannot collide.
fn generate_voucher_code(tier_points: u64) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();
    format!("LOYALTY{tier_points}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_embeds_tier_and_random_suffix() {
        let code = generate_voucher_code(1000);
        let (prefix, suffix) = code.split_once('-').expect("code has a suffix");
        assert_eq!(prefix, "LOYALTY1000");
        assert_eq!(suffix.len(), CODE_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(!suffix.chars().any(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn codes_differ_between_calls() {
        let first = generate_voucher_code(500);
        let second = generate_voucher_code(500);
        assert_ne!(first, second);
    }
}
