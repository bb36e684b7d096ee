//! Momiji loyalty points service library.
//!
//! Exposes the service as a library so the router can be driven directly
//! from the integration-tests crate.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod ledger;
pub mod routes;
pub mod shopify;
pub mod state;
