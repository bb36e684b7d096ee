//! Loyalty service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOPIFY_STORE` - Shopify store domain (e.g., your-store.myshopify.com)
//! - `SHOPIFY_ADMIN_ACCESS_TOKEN` - Admin API access token
//! - `SHOPIFY_WEBHOOK_SECRET` - Shared secret for webhook HMAC verification
//!
//! ## Optional
//! - `LOYALTY_HOST` - Bind address (default: 127.0.0.1)
//! - `LOYALTY_PORT` - Listen port (default: 3002)
//! - `LOYALTY_MARK_GUEST_ORDERS` - Write a skipped award record for orders
//!   with no customer attached, making replayed guest-order webhooks a
//!   guaranteed no-op (default: false, i.e. guest orders stay retryable)
//! - `SHOPIFY_API_VERSION` - Admin API version (default: 2025-01)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Loyalty service configuration.
#[derive(Debug, Clone)]
pub struct LoyaltyConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Permanently mark guest (no-customer) orders as skipped
    pub mark_guest_orders: bool,
    /// Shopify Admin API configuration
    pub shopify: ShopifyAdminConfig,
    /// Shared secret for webhook HMAC verification
    pub webhook_secret: SecretString,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Shopify Admin API configuration.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct ShopifyAdminConfig {
    /// Shopify store domain (e.g., your-store.myshopify.com)
    pub store: String,
    /// Shopify Admin API version (e.g., 2025-01)
    pub api_version: String,
    /// Admin API access token (server-side only, high privilege)
    pub access_token: SecretString,
}

impl std::fmt::Debug for ShopifyAdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyAdminConfig")
            .field("store", &self.store)
            .field("api_version", &self.api_version)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl LoyaltyConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("LOYALTY_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("LOYALTY_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("LOYALTY_PORT", "3002")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("LOYALTY_PORT".to_string(), e.to_string()))?;
        let mark_guest_orders = get_env_or_default("LOYALTY_MARK_GUEST_ORDERS", "false")
            .parse::<bool>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("LOYALTY_MARK_GUEST_ORDERS".to_string(), e.to_string())
            })?;

        let shopify = ShopifyAdminConfig::from_env()?;
        let webhook_secret = get_secret("SHOPIFY_WEBHOOK_SECRET")?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(Self {
            host,
            port,
            mark_guest_orders,
            shopify,
            webhook_secret,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl ShopifyAdminConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            store: get_required_env("SHOPIFY_STORE")?,
            api_version: get_env_or_default("SHOPIFY_API_VERSION", "2025-01"),
            access_token: get_secret("SHOPIFY_ADMIN_ACCESS_TOKEN")?,
        })
    }

    /// GraphQL endpoint URL for this store and API version.
    #[must_use]
    pub fn graphql_endpoint(&self) -> String {
        format!(
            "https://{}/admin/api/{}/graphql.json",
            self.store, self.api_version
        )
    }
}

fn get_required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn get_env_or_default(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn get_optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn get_secret(name: &str) -> Result<SecretString, ConfigError> {
    get_required_env(name).map(SecretString::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_endpoint_includes_store_and_version() {
        let config = ShopifyAdminConfig {
            store: "momiji-dev.myshopify.com".to_string(),
            api_version: "2025-01".to_string(),
            access_token: SecretString::from("shpat_test"),
        };
        assert_eq!(
            config.graphql_endpoint(),
            "https://momiji-dev.myshopify.com/admin/api/2025-01/graphql.json"
        );
    }

    #[test]
    fn debug_redacts_access_token() {
        let config = ShopifyAdminConfig {
            store: "momiji-dev.myshopify.com".to_string(),
            api_version: "2025-01".to_string(),
            access_token: SecretString::from("shpat_super_secret"),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("shpat_super_secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
