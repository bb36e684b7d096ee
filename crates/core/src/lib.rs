//! Shared loyalty domain logic for Momiji.
//!
//! This crate holds the pure parts of the points system: the points
//! calculator, the voucher redemption catalog, and Shopify GID helpers.
//! Nothing here performs I/O; all remote state lives behind the ledger
//! in the `momiji-loyalty` service crate.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod gid;
pub mod points;
pub mod vouchers;

pub use points::{POINTS_PER_YEN, points_for_amount};
pub use vouchers::{VOUCHER_LEVELS, VoucherLevel, available_vouchers, next_voucher_level, voucher_level};
