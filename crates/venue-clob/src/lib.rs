//! Order-book venue ("B") adapter.
//!
//! Implements the uniform [`arbot_core::VenueAdapter`] contract over the
//! CLOB venue: session tokens obtained by signing a server challenge,
//! EIP-712 typed orders posted to `/orders`, and normalization of the
//! venue's status vocabulary into the shared closed set.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::{SessionAuth, SessionToken};
pub use client::{ClobVenue, ClobVenueConfig};
