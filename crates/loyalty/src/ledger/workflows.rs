//! Award, reversal, and redemption workflows.
//!
//! Each workflow is a strictly ordered sequence of remote calls run to
//! completion within one request, holding the customer lock for the whole
//! read-modify-write span. Idempotency markers are checked before any
//! balance mutation so a retried webhook observes the guard first.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;

use momiji_core::{points_for_amount, voucher_level};

use super::{AwardRecord, Ledger, LedgerError};

/// A paid order as extracted from the order-paid webhook.
#[derive(Debug, Clone)]
pub struct PaidOrder {
    pub order_id: String,
    /// Absent for guest checkouts.
    pub customer_id: Option<String>,
    /// Subtotal excluding tax and shipping.
    pub subtotal: Decimal,
    pub currency: String,
}

/// A refund as extracted from the refund-created webhook.
#[derive(Debug, Clone)]
pub struct OrderRefund {
    pub refund_id: String,
    pub order_id: String,
    pub customer_id: Option<String>,
    /// Sum of the refunded line-item subtotals.
    pub refunded_subtotal: Decimal,
    pub currency: String,
}

/// Result of running the award workflow for one order-paid event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwardOutcome {
    /// No customer attached to the order.
    NoCustomer,
    /// An award record already exists; the event is a replay.
    AlreadyAwarded,
    /// Zero points computed; the order was marked skipped.
    NothingToAward,
    /// Points were credited and the order marked awarded.
    Awarded { points: u64, new_balance: u64 },
}

/// Result of running the reversal workflow for one refund-created event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReversalOutcome {
    /// No customer attached to the refund's order.
    NoCustomer,
    /// The order never had points awarded.
    NoAward,
    /// This refund id was already reversed; the event is a replay.
    AlreadyReversed,
    /// The refund amount computed to zero points.
    NothingToReverse,
    /// Points were clawed back.
    Reversed { points: u64, new_balance: u64 },
}

/// Successful redemption result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub code: String,
    pub points_redeemed: u64,
    pub discount_value: u64,
    pub new_balance: u64,
}

/// Errors from the redemption workflow.
#[derive(Debug, Error)]
pub enum RedeemError {
    /// The requested points amount matches no catalog tier.
    #[error("invalid voucher level")]
    InvalidTier,

    /// The customer's balance is below the tier's requirement.
    #[error("insufficient points: required {required}, available {available}")]
    InsufficientPoints { required: u64, available: u64 },

    /// A remote write or issuance failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl Ledger {
    /// Award loyalty points for a paid order.
    ///
    /// Idempotent under webhook retries: the award record is checked before
    /// any balance mutation, and zero-point orders are marked skipped so a
    /// replay does not recompute. Guest orders are only marked when the
    /// `mark_guest_orders` configuration flag is set; otherwise they stay
    /// retryable in case a customer is attached later.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` if the balance credit or the award-record
    /// write fails. A failure between the two leaves the order unmarked, so
    /// Shopify's webhook retry re-runs the workflow; the balance credit is
    /// then repeated, which is the accepted cost of having no remote
    /// transaction (the alternative, marking first, would lose points).
    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    pub async fn award_order(&self, order: &PaidOrder) -> Result<AwardOutcome, LedgerError> {
        let Some(customer_id) = order.customer_id.as_deref() else {
            tracing::info!(order_id = %order.order_id, "No customer attached, skipping award");
            if self.mark_guest_orders() && self.order_award(&order.order_id).await.is_none() {
                self.record_award(&order.order_id, &AwardRecord::skipped())
                    .await?;
            }
            return Ok(AwardOutcome::NoCustomer);
        };

        let _guard = self.lock_customer(customer_id).await;

        if self.order_award(&order.order_id).await.is_some() {
            tracing::info!(order_id = %order.order_id, "Points already awarded, skipping");
            return Ok(AwardOutcome::AlreadyAwarded);
        }

        let points = points_for_amount(order.subtotal, &order.currency);
        if points == 0 {
            tracing::info!(
                order_id = %order.order_id,
                subtotal = %order.subtotal,
                currency = %order.currency,
                "No points to award, marking order skipped"
            );
            self.record_award(&order.order_id, &AwardRecord::skipped())
                .await?;
            return Ok(AwardOutcome::NothingToAward);
        }

        let new_balance = self.add_points(customer_id, points).await?;
        self.record_award(&order.order_id, &AwardRecord::awarded(points))
            .await?;

        tracing::info!(
            order_id = %order.order_id,
            customer_id,
            points,
            new_balance,
            "Awarded loyalty points"
        );

        Ok(AwardOutcome::Awarded { points, new_balance })
    }

    /// Reverse loyalty points for a refund, proportional to the refunded
    /// subtotal.
    ///
    /// Idempotent per refund id: each reversal is recorded in the order's
    /// award record, so duplicate webhook delivery subtracts exactly once.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` if the balance debit or the record update
    /// fails. A failure between the two leaves the refund unrecorded and
    /// the retry subtracts again; over-subtraction clamps at zero.
    #[instrument(skip(self, refund), fields(refund_id = %refund.refund_id, order_id = %refund.order_id))]
    pub async fn reverse_refund(
        &self,
        refund: &OrderRefund,
    ) -> Result<ReversalOutcome, LedgerError> {
        let Some(customer_id) = refund.customer_id.as_deref() else {
            tracing::info!(order_id = %refund.order_id, "No customer attached, skipping reversal");
            return Ok(ReversalOutcome::NoCustomer);
        };

        let _guard = self.lock_customer(customer_id).await;

        let Some(mut record) = self.order_award(&refund.order_id).await else {
            tracing::info!(order_id = %refund.order_id, "No points were awarded for this order");
            return Ok(ReversalOutcome::NoAward);
        };

        if record.points == 0 {
            return Ok(ReversalOutcome::NoAward);
        }

        if record
            .reversed_refund_ids
            .iter()
            .any(|id| id == &refund.refund_id)
        {
            tracing::info!(refund_id = %refund.refund_id, "Refund already reversed, skipping");
            return Ok(ReversalOutcome::AlreadyReversed);
        }

        let points = points_for_amount(refund.refunded_subtotal, &refund.currency);
        if points == 0 {
            return Ok(ReversalOutcome::NothingToReverse);
        }

        let new_balance = self.subtract_points(customer_id, points).await?;
        record.reversed_refund_ids.push(refund.refund_id.clone());
        self.record_award(&refund.order_id, &record).await?;

        tracing::info!(
            refund_id = %refund.refund_id,
            customer_id,
            points,
            new_balance,
            "Reversed loyalty points"
        );

        Ok(ReversalOutcome::Reversed { points, new_balance })
    }

    /// Redeem points for a discount voucher.
    ///
    /// The voucher is issued *before* points are deducted: if issuance
    /// fails the balance is untouched, while the reverse failure mode (a
    /// voucher issued but the deduction failing) only costs the shop, never
    /// the customer, and is surfaced to the caller for compensation.
    ///
    /// # Errors
    ///
    /// - `RedeemError::InvalidTier` if `requested_tier_points` matches no
    ///   catalog tier exactly.
    /// - `RedeemError::InsufficientPoints` if the balance is too low.
    /// - `RedeemError::Ledger` if issuance or deduction fails remotely.
    #[instrument(skip(self))]
    pub async fn redeem(
        &self,
        customer_id: &str,
        requested_tier_points: u64,
    ) -> Result<Redemption, RedeemError> {
        let level = voucher_level(requested_tier_points).ok_or(RedeemError::InvalidTier)?;

        let _guard = self.lock_customer(customer_id).await;

        let available = self.balance(customer_id).await;
        if available < level.points {
            return Err(RedeemError::InsufficientPoints {
                required: level.points,
                available,
            });
        }

        let code = self
            .admin()
            .issue_voucher(customer_id, level)
            .await
            .map_err(LedgerError::RemoteIssuance)?;

        let new_balance = self.subtract_points(customer_id, level.points).await?;

        tracing::info!(
            customer_id,
            points = level.points,
            code = %code,
            new_balance,
            "Redeemed points for voucher"
        );

        Ok(Redemption {
            code,
            points_redeemed: level.points,
            discount_value: level.value,
            new_balance,
        })
    }
}
