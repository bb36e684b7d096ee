//! Shopify GID helpers.
//!
//! Webhook payloads carry bare numeric ids while the Admin GraphQL API
//! addresses entities by GID (`gid://shopify/Customer/123`). These helpers
//! convert in both directions and are idempotent on already-formatted input.

const CUSTOMER_PREFIX: &str = "gid://shopify/Customer/";
const ORDER_PREFIX: &str = "gid://shopify/Order/";

/// Format a customer id as a Shopify GID.
#[must_use]
pub fn customer_gid(customer_id: &str) -> String {
    if customer_id.starts_with(CUSTOMER_PREFIX) {
        customer_id.to_string()
    } else {
        format!("{CUSTOMER_PREFIX}{customer_id}")
    }
}

/// Format an order id as a Shopify GID.
#[must_use]
pub fn order_gid(order_id: &str) -> String {
    if order_id.starts_with(ORDER_PREFIX) {
        order_id.to_string()
    } else {
        format!("{ORDER_PREFIX}{order_id}")
    }
}

/// Extract the trailing numeric id from a GID.
#[must_use]
pub fn id_from_gid(gid: &str) -> &str {
    gid.rsplit('/').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ids_are_prefixed() {
        assert_eq!(customer_gid("123"), "gid://shopify/Customer/123");
        assert_eq!(order_gid("456"), "gid://shopify/Order/456");
    }

    #[test]
    fn formatting_is_idempotent() {
        let gid = "gid://shopify/Customer/123";
        assert_eq!(customer_gid(gid), gid);
    }

    #[test]
    fn id_extraction() {
        assert_eq!(id_from_gid("gid://shopify/Order/789"), "789");
        assert_eq!(id_from_gid("789"), "789");
    }
}
