//! Application state shared across handlers.

use std::sync::Arc;

use secrecy::SecretString;

use crate::config::LoyaltyConfig;
use crate::ledger::Ledger;
use crate::shopify::{AdminClient, AdminError};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: LoyaltyConfig,
    ledger: Ledger,
}

impl AppState {
    /// Create application state from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Admin API client fails to build.
    pub fn new(config: LoyaltyConfig) -> Result<Self, AdminError> {
        let admin = AdminClient::new(&config.shopify)?;
        Ok(Self::with_admin_client(config, admin))
    }

    /// Create application state with an explicit Admin client.
    ///
    /// Integration tests use this to inject a client pointed at a mock
    /// Shopify endpoint.
    #[must_use]
    pub fn with_admin_client(config: LoyaltyConfig, admin: AdminClient) -> Self {
        let ledger = Ledger::new(admin, config.mark_guest_orders);
        Self {
            inner: Arc::new(AppStateInner { config, ledger }),
        }
    }

    /// Get a reference to the service configuration.
    #[must_use]
    pub fn config(&self) -> &LoyaltyConfig {
        &self.inner.config
    }

    /// Get a reference to the loyalty ledger.
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.inner.ledger
    }

    /// Shared secret for webhook HMAC verification.
    #[must_use]
    pub fn webhook_secret(&self) -> &SecretString {
        &self.inner.config.webhook_secret
    }
}
