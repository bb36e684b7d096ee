//! Shopify Admin API client (HIGH PRIVILEGE).
//!
//! The loyalty ledger consumes exactly three Admin API capabilities:
//! metafield reads, metafield writes (`customerUpdate` / `orderUpdate`),
//! and `discountCodeBasicCreate`. The GraphQL documents are small and
//! fixed, so they are written inline and sent as plain JSON POSTs with
//! `reqwest` rather than going through schema codegen.

mod admin;
mod discounts;

pub use admin::{AdminClient, MetafieldInput, MetafieldOwner};

use thiserror::Error;

/// Errors that can occur when interacting with the Shopify Admin API.
#[derive(Debug, Error)]
pub enum AdminError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server responded with a non-success status.
    #[error("server error: HTTP {0}")]
    Status(u16),

    /// GraphQL query returned errors.
    #[error("GraphQL errors: {0}")]
    GraphQL(String),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by Shopify.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication/authorization failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Field-level user error from a mutation (e.g., invalid input).
    #[error("user error: {0}")]
    UserError(String),

    /// The response was missing an expected field.
    #[error("missing data in response: {0}")]
    MissingData(&'static str),
}

impl AdminError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Transport errors, 5xx responses and throttling are transient;
    /// validation, auth and other 4xx failures are permanent for a given
    /// request.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) => true,
            Self::Status(code) => *code >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_are_not_transient() {
        assert!(!AdminError::UserError("value is invalid".to_string()).is_transient());
        assert!(!AdminError::Unauthorized("bad token".to_string()).is_transient());
        assert!(!AdminError::MissingData("code").is_transient());
    }

    #[test]
    fn server_failures_are_transient() {
        assert!(AdminError::Status(500).is_transient());
        assert!(AdminError::Status(502).is_transient());
        assert!(AdminError::RateLimited(30).is_transient());
    }

    #[test]
    fn client_statuses_are_not_transient() {
        assert!(!AdminError::Status(400).is_transient());
        assert!(!AdminError::Status(404).is_transient());
        assert!(!AdminError::Status(422).is_transient());
    }
}
