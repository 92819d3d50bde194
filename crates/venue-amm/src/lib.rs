//! AMM venue ("A") adapter.
//!
//! Implements the uniform [`arbot_core::VenueAdapter`] contract over the
//! AMM-priced venue's REST API: EIP-712 typed-data orders, per-request
//! signed headers, a client-held nonce that increments only on success,
//! and idempotent exchange-contract approvals.

pub mod client;
pub mod sign;
pub mod types;

pub use client::{AmmVenue, AmmVenueConfig};
pub use sign::{build_order, order_digest, BuildOrderParams, OrderSignError, TypedOrder};
