//! Crypto exchange gateway.
//!
//! Quotes and creates exchanges through a third-party provider, holds large
//! exchanges from unverified callers in a custodial wallet, and releases
//! them through a reconciliation run once the owner verifies.

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
