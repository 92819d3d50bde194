//! Core types and contracts for the cross-venue arbitrage platform.
//!
//! This crate defines everything the trading engine and the venue
//! adapters agree on: the data model (quotes, opportunities, positions),
//! the uniform [`adapter::VenueAdapter`] contract, the [`signer::Signer`]
//! interface, per-agent configuration, and the trade persistence
//! interface.

pub mod adapter;
pub mod config;
pub mod error;
pub mod repository;
pub mod signer;
pub mod types;

pub use adapter::{
    OpenOrder, OrderRequest, OrderStatusReport, PlaceOrderResult, QuoteFeed, VenueAdapter,
    DRY_RUN_ORDER_ID,
};
pub use config::{AgentConfig, ExecutionMode};
pub use error::{SignerError, VenueError};
pub use repository::{MemoryTradeRepository, TradePatch, TradeRecord, TradeRepository};
pub use signer::{KeySigner, Signer, TxRequest};
pub use types::{
    fingerprint, ArbOpportunity, EventMeta, MarketQuote, OrderStatus, Outcome, Position,
    PositionLeg, PositionStatus, QuoteSnapshot, Side, Venue,
};
