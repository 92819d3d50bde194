//! The per-user arbitrage trading engine.
//!
//! Cross-venue arbitrage on binary markets: when YES on one venue plus
//! NO on the other costs less than the guaranteed one-unit payout, both
//! sides are bought and the difference is locked in.
//!
//! ```text
//! AMM venue:  YES @ 0.45
//! CLOB venue: NO  @ 0.48
//! Combined cost:  0.93 per unit of payout
//! Guaranteed payout: 1.00 (700 bps gross spread)
//! ```
//!
//! # Modules
//!
//! - [`catalog`]: tracked markets and per-venue token ids
//! - [`quotes`]: fail-open snapshot assembly across venues
//! - [`fees`]: venue fees and gas, in quote units
//! - [`detector`]: directional pairing, net spreads, ranking
//! - [`sizing`]: half-Kelly sizing and the risk gate
//! - [`executor`]: two-legged execution, fill polling, unwind
//! - [`positions`]: position store and audit log
//! - [`agent`]: the scan→detect→size→execute cycle
//! - [`testkit`]: scripted venue doubles for tests

pub mod agent;
pub mod catalog;
pub mod detector;
pub mod executor;
pub mod fees;
pub mod positions;
pub mod quotes;
pub mod sizing;
pub mod testkit;

pub use agent::{Agent, AgentDeps, AgentStatus, CycleOutcome};
pub use catalog::{MarketCatalog, MarketMeta, MarketTokens};
pub use detector::{Detector, DEFAULT_HORIZON_DAYS};
pub use executor::{ExecutionOutcome, Executor, PauseState, PAUSE_REASON_PARTIAL};
pub use fees::{ExecutionFees, FeeCalculator, FeeConfig};
pub use positions::{PositionStore, TransitionRecord};
pub use quotes::QuoteSource;
pub use sizing::{position_size, DailyLossTracker, GateContext, RejectReason};
