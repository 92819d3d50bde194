//! Per-agent trading configuration.
//!
//! Every recognized option is enumerated here; unknown keys are rejected
//! at deserialization. Updates are accepted between scans, never
//! mid-execution.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// =============================================================================
// Execution Mode
// =============================================================================

/// How orders are actually executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Direct CLOB order placement.
    Clob,
    /// Execution routed through a vault contract.
    Vault,
    /// No network mutations; synthetic fills.
    DryRun,
}

impl ExecutionMode {
    /// Returns true if network mutations are short-circuited.
    #[must_use]
    pub fn is_dry_run(self) -> bool {
        matches!(self, Self::DryRun)
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clob => write!(f, "clob"),
            Self::Vault => write!(f, "vault"),
            Self::DryRun => write!(f, "dry-run"),
        }
    }
}

// =============================================================================
// Agent Configuration
// =============================================================================

/// Configuration for one trading agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AgentConfig {
    /// Minimum notional per trade, in quote units.
    pub min_trade_size: Decimal,

    /// Maximum notional per trade, in quote units.
    pub max_trade_size: Decimal,

    /// Net-spread floor in basis points; opportunities below are dropped.
    pub min_spread_bps: Decimal,

    /// Optional cap on trades per session.
    pub max_total_trades: Option<u32>,

    /// Optional session time-to-live in milliseconds.
    pub trading_duration_ms: Option<u64>,

    /// Stop-loss: halt new executions once daily realized losses reach
    /// this amount.
    pub daily_loss_limit: Option<Decimal>,

    /// Reject markets resolving later than this many days out.
    pub max_resolution_days: Option<i64>,

    /// Interval between fill polls, in milliseconds.
    pub fill_poll_interval_ms: u64,

    /// Total fill-poll budget, in milliseconds.
    pub fill_poll_timeout_ms: u64,

    /// Interval between unwind polls, in milliseconds.
    pub unwind_poll_interval_ms: u64,

    /// Native-token price in quote units (6-dec), for gas conversion.
    pub gas_to_quote_rate: Decimal,

    /// How orders are executed.
    pub execution_mode: ExecutionMode,

    /// Interval between scan cycles, in milliseconds.
    pub scan_interval_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            min_trade_size: dec!(1),
            max_trade_size: dec!(100),
            min_spread_bps: dec!(50),
            max_total_trades: None,
            trading_duration_ms: None,
            daily_loss_limit: None,
            max_resolution_days: None,
            fill_poll_interval_ms: 1_000,
            fill_poll_timeout_ms: 30_000,
            unwind_poll_interval_ms: 2_000,
            gas_to_quote_rate: dec!(0.50),
            execution_mode: ExecutionMode::Clob,
            scan_interval_ms: 5_000,
        }
    }
}

impl AgentConfig {
    /// Creates a dry-run configuration for testing.
    #[must_use]
    pub fn dry_run() -> Self {
        Self {
            execution_mode: ExecutionMode::DryRun,
            ..Default::default()
        }
    }

    /// Sets the maximum trade size.
    #[must_use]
    pub fn with_max_trade_size(mut self, size: Decimal) -> Self {
        self.max_trade_size = size;
        self
    }

    /// Sets the minimum trade size.
    #[must_use]
    pub fn with_min_trade_size(mut self, size: Decimal) -> Self {
        self.min_trade_size = size;
        self
    }

    /// Sets the net-spread floor.
    #[must_use]
    pub fn with_min_spread_bps(mut self, bps: Decimal) -> Self {
        self.min_spread_bps = bps;
        self
    }

    /// Sets the session trade cap.
    #[must_use]
    pub fn with_max_total_trades(mut self, trades: u32) -> Self {
        self.max_total_trades = Some(trades);
        self
    }

    /// Sets the session time-to-live.
    #[must_use]
    pub fn with_trading_duration_ms(mut self, ms: u64) -> Self {
        self.trading_duration_ms = Some(ms);
        self
    }

    /// Sets the daily loss limit.
    #[must_use]
    pub fn with_daily_loss_limit(mut self, limit: Decimal) -> Self {
        self.daily_loss_limit = Some(limit);
        self
    }

    /// Validates internal consistency.
    ///
    /// # Errors
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_trade_size <= Decimal::ZERO {
            return Err("min_trade_size must be positive".to_string());
        }
        if self.max_trade_size < self.min_trade_size {
            return Err("max_trade_size must be >= min_trade_size".to_string());
        }
        if self.fill_poll_interval_ms == 0 || self.scan_interval_ms == 0 {
            return Err("poll and scan intervals must be positive".to_string());
        }
        if self.fill_poll_timeout_ms < self.fill_poll_interval_ms {
            return Err("fill_poll_timeout_ms must cover at least one interval".to_string());
        }
        Ok(())
    }
}
