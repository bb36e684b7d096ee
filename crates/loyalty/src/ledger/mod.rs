//! Loyalty points ledger over Shopify metafields.
//!
//! All ledger state lives remotely: one integer metafield per customer
//! (`loyalty.points`) and one JSON award record per order (`loyalty.award`).
//! The remote store offers no transactions and no compare-and-swap, which
//! shapes two policies here:
//!
//! - **Reads fail open.** A transport or parse failure on a read is logged
//!   and treated as "no value" (balance 0, no award record) so commerce
//!   flows are never blocked on the ledger. Points may be under-reported
//!   until the store recovers.
//! - **Writes fail loud.** A failed write after a successful read can
//!   silently lose points, so write failures always propagate as
//!   [`LedgerError`] for the caller to surface or retry.
//!
//! Read-modify-write sequences (award, reversal, redemption) are serialized
//! per customer through an in-process async lock. Concurrent invocations
//! for the same customer in *different* processes still race last-writer-
//! wins; closing that requires an atomic remote primitive Shopify does not
//! provide for metafields.

mod workflows;

pub use workflows::{
    AwardOutcome, OrderRefund, PaidOrder, RedeemError, Redemption, ReversalOutcome,
};

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

use momiji_core::gid::{customer_gid, order_gid};

use crate::shopify::{AdminClient, AdminError, MetafieldInput, MetafieldOwner};

/// Metafield namespace owned by the loyalty system.
pub const METAFIELD_NAMESPACE: &str = "loyalty";
/// Customer metafield key holding the points balance.
pub const CUSTOMER_POINTS_KEY: &str = "points";
/// Order metafield key holding the award record.
pub const ORDER_AWARD_KEY: &str = "award";

/// Errors from ledger write paths. Reads never error (they fail open).
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A balance or award-record write was rejected or failed.
    #[error("remote update failed: {0}")]
    RemoteUpdate(AdminError),

    /// Voucher issuance was rejected or returned no code.
    #[error("voucher issuance failed: {0}")]
    RemoteIssuance(AdminError),
}

/// Terminal state of an order's award processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwardState {
    /// Points were credited to the customer.
    Awarded,
    /// Processing finished without a credit (zero points, or a guest order
    /// when `mark_guest_orders` is enabled).
    Skipped,
}

/// Per-order award record, persisted as one JSON metafield.
///
/// Presence of the record is the idempotency marker for the award workflow;
/// `reversed_refund_ids` is the matching marker for refund reversals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardRecord {
    pub state: AwardState,
    pub points: u64,
    #[serde(default)]
    pub reversed_refund_ids: Vec<String>,
}

impl AwardRecord {
    /// Record for an order that credited `points`.
    #[must_use]
    pub const fn awarded(points: u64) -> Self {
        Self {
            state: AwardState::Awarded,
            points,
            reversed_refund_ids: Vec::new(),
        }
    }

    /// Record for an order that finished without a credit.
    #[must_use]
    pub const fn skipped() -> Self {
        Self {
            state: AwardState::Skipped,
            points: 0,
            reversed_refund_ids: Vec::new(),
        }
    }
}

/// Registry of per-customer async locks.
///
/// Entries are created on first use and pruned once idle, so the map is
/// bounded by the number of customers with in-flight operations rather
/// than every customer ever seen.
#[derive(Default)]
struct CustomerLocks {
    map: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CustomerLocks {
    async fn acquire(&self, customer_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.map.lock().await;
            // A strong count of 1 means no guard is held and no acquire is
            // waiting; only the map itself still references the lock.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(customer_id.to_string()).or_default())
        };
        entry.lock_owned().await
    }
}

/// The loyalty points ledger.
///
/// Cheaply cloneable; shares the Admin client and lock registry.
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<LedgerInner>,
}

struct LedgerInner {
    admin: AdminClient,
    locks: CustomerLocks,
    mark_guest_orders: bool,
}

impl Ledger {
    /// Create a ledger over an Admin API client.
    #[must_use]
    pub fn new(admin: AdminClient, mark_guest_orders: bool) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                admin,
                locks: CustomerLocks::default(),
                mark_guest_orders,
            }),
        }
    }

    pub(crate) fn admin(&self) -> &AdminClient {
        &self.inner.admin
    }

    pub(crate) fn mark_guest_orders(&self) -> bool {
        self.inner.mark_guest_orders
    }

    /// Serialize subsequent ledger operations for one customer.
    ///
    /// Award, reversal, and redemption each hold this lock for their whole
    /// read-modify-write sequence.
    pub(crate) async fn lock_customer(&self, customer_id: &str) -> OwnedMutexGuard<()> {
        self.inner.locks.acquire(customer_id).await
    }

    // =========================================================================
    // Balance operations
    // =========================================================================

    /// Current points balance for a customer.
    ///
    /// Absence of the metafield means a balance of 0. Read failures are
    /// logged and also yield 0 (fail-open policy, see module docs).
    #[instrument(skip(self))]
    pub async fn balance(&self, customer_id: &str) -> u64 {
        let gid = customer_gid(customer_id);
        match self
            .inner
            .admin
            .metafield(
                MetafieldOwner::Customer,
                &gid,
                METAFIELD_NAMESPACE,
                CUSTOMER_POINTS_KEY,
            )
            .await
        {
            Ok(Some(value)) => value.parse().unwrap_or_else(|_| {
                tracing::warn!(customer_id, value, "Unparseable points balance, treating as 0");
                0
            }),
            Ok(None) => 0,
            Err(err) => {
                tracing::warn!(customer_id, error = %err, "Balance read failed, treating as 0");
                0
            }
        }
    }

    /// Overwrite a customer's balance with a whole value.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::RemoteUpdate` if the write is rejected; the
    /// caller must not swallow this (see module docs).
    #[instrument(skip(self))]
    pub async fn set_balance(&self, customer_id: &str, points: u64) -> Result<(), LedgerError> {
        let gid = customer_gid(customer_id);
        let metafields = [MetafieldInput::integer(
            METAFIELD_NAMESPACE,
            CUSTOMER_POINTS_KEY,
            points,
        )];

        self.inner
            .admin
            .set_customer_metafields(&gid, &metafields)
            .await
            .map_err(LedgerError::RemoteUpdate)
    }

    /// Add points to a customer's balance; returns the new balance.
    ///
    /// Read-then-write; callers must hold the customer lock.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::RemoteUpdate` if the write fails.
    pub async fn add_points(&self, customer_id: &str, delta: u64) -> Result<u64, LedgerError> {
        let current = self.balance(customer_id).await;
        let updated = current.saturating_add(delta);
        self.set_balance(customer_id, updated).await?;
        Ok(updated)
    }

    /// Subtract points from a customer's balance, clamping at zero; returns
    /// the new balance.
    ///
    /// Read-then-write; callers must hold the customer lock.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::RemoteUpdate` if the write fails.
    pub async fn subtract_points(&self, customer_id: &str, delta: u64) -> Result<u64, LedgerError> {
        let current = self.balance(customer_id).await;
        let updated = current.saturating_sub(delta);
        self.set_balance(customer_id, updated).await?;
        Ok(updated)
    }

    // =========================================================================
    // Order award records
    // =========================================================================

    /// Fetch an order's award record, if processing has completed before.
    ///
    /// Absence means the order is unseen. Read and parse failures are
    /// logged and treated as absence (fail-open policy).
    #[instrument(skip(self))]
    pub async fn order_award(&self, order_id: &str) -> Option<AwardRecord> {
        let gid = order_gid(order_id);
        match self
            .inner
            .admin
            .metafield(MetafieldOwner::Order, &gid, METAFIELD_NAMESPACE, ORDER_AWARD_KEY)
            .await
        {
            Ok(Some(value)) => match serde_json::from_str(&value) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!(order_id, error = %err, "Unparseable award record, treating as unseen");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(order_id, error = %err, "Award record read failed, treating as unseen");
                None
            }
        }
    }

    /// Persist an order's award record as a single JSON metafield.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::RemoteUpdate` if the write is rejected.
    #[instrument(skip(self, record))]
    pub async fn record_award(
        &self,
        order_id: &str,
        record: &AwardRecord,
    ) -> Result<(), LedgerError> {
        let gid = order_gid(order_id);
        let metafield =
            MetafieldInput::structured(METAFIELD_NAMESPACE, ORDER_AWARD_KEY, record)
                .map_err(LedgerError::RemoteUpdate)?;

        self.inner
            .admin
            .set_order_metafields(&gid, &[metafield])
            .await
            .map_err(LedgerError::RemoteUpdate)
    }

    /// Whether the award workflow has already completed for an order.
    pub async fn has_order_been_awarded(&self, order_id: &str) -> bool {
        self.order_award(order_id).await.is_some()
    }

    /// Points originally credited for an order (0 when unseen or skipped).
    pub async fn order_awarded_points(&self, order_id: &str) -> u64 {
        self.order_award(order_id).await.map_or(0, |r| r.points)
    }
}
