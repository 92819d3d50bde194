//! Position sizing and the pre-execution risk gate.
//!
//! Sizing is half-Kelly against available capital, capped per leg at 90%
//! of that leg's venue liquidity and by half the configured maximum
//! trade size. The risk gate then applies the non-negotiable rejections:
//! minimum notional, resolution horizon, venue balances, the daily loss
//! stop, and session caps. Rejections carry machine-readable reason
//! codes; the caller tries the next-best opportunity.
//!
//! Daily losses reset at UTC midnight.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use arbot_core::{AgentConfig, ArbOpportunity};

/// Assumed probability that a detected pair settles as priced.
const KELLY_WIN_PROB: Decimal = dec!(0.95);

/// Complement of [`KELLY_WIN_PROB`].
const KELLY_LOSS_PROB: Decimal = dec!(0.05);

/// Share of quoted liquidity a leg may consume.
const LIQUIDITY_HAIRCUT: Decimal = dec!(0.9);

// =============================================================================
// Rejection Reasons
// =============================================================================

/// Why an opportunity was refused before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// Sized notional fell below the configured minimum.
    BelowMinSize,
    /// Market resolves beyond the configured horizon.
    ResolutionTooFar,
    /// A venue's stable balance cannot cover the notional.
    InsufficientBalance,
    /// Daily realized losses reached the stop.
    DailyLossLimit,
    /// Session trade cap reached.
    MaxTradesReached,
    /// Session time-to-live elapsed.
    SessionExpired,
}

impl RejectReason {
    /// Returns the machine-readable reason code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BelowMinSize => "below_min_size",
            Self::ResolutionTooFar => "resolution_too_far",
            Self::InsufficientBalance => "insufficient_balance",
            Self::DailyLossLimit => "daily_loss_limit",
            Self::MaxTradesReached => "max_trades_reached",
            Self::SessionExpired => "session_expired",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Sizing
// =============================================================================

/// Computes the per-leg notional for an opportunity.
///
/// Returns zero when the opportunity has no positive edge.
#[must_use]
pub fn position_size(
    opportunity: &ArbOpportunity,
    config: &AgentConfig,
    available_capital: Decimal,
) -> Decimal {
    let base = config.max_trade_size / dec!(2);
    let capped = base
        .min(opportunity.liquidity_a * LIQUIDITY_HAIRCUT)
        .min(opportunity.liquidity_b * LIQUIDITY_HAIRCUT);

    if opportunity.total_cost <= Decimal::ZERO || capped <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    // Half-Kelly with b = (payout - cost) / cost.
    let b = (opportunity.guaranteed_payout - opportunity.total_cost) / opportunity.total_cost;
    if b <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let fraction = ((KELLY_WIN_PROB * b - KELLY_LOSS_PROB) / b).max(Decimal::ZERO) / dec!(2);

    (fraction * available_capital).min(capped)
}

// =============================================================================
// Daily Loss Tracking
// =============================================================================

/// Accumulates realized losses for the current UTC day.
#[derive(Debug)]
pub struct DailyLossTracker {
    state: Mutex<(NaiveDate, Decimal)>,
}

impl Default for DailyLossTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DailyLossTracker {
    /// Creates a tracker for today.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new((Utc::now().date_naive(), Decimal::ZERO)),
        }
    }

    /// Records a realized PnL figure (losses are negative).
    pub fn record(&self, pnl: Decimal) {
        let mut state = self.state.lock();
        self.roll(&mut state);
        state.1 += pnl;
    }

    /// Returns today's accumulated loss as a non-negative magnitude.
    #[must_use]
    pub fn loss_today(&self) -> Decimal {
        let mut state = self.state.lock();
        self.roll(&mut state);
        (-state.1).max(Decimal::ZERO)
    }

    fn roll(&self, state: &mut (NaiveDate, Decimal)) {
        let today = Utc::now().date_naive();
        if state.0 != today {
            *state = (today, Decimal::ZERO);
        }
    }
}

// =============================================================================
// Risk Gate
// =============================================================================

/// Session facts the gate evaluates against.
#[derive(Debug, Clone)]
pub struct GateContext {
    /// When the session started.
    pub session_start: DateTime<Utc>,
    /// Trades executed this session.
    pub trades_executed: u32,
    /// Today's realized loss magnitude.
    pub loss_today: Decimal,
    /// Stable balance on venue A.
    pub balance_a: Decimal,
    /// Stable balance on venue B.
    pub balance_b: Decimal,
}

/// Applies the ordered rejection checks of the risk gate.
///
/// # Errors
/// Returns the first violated constraint's reason code.
pub fn check(
    opportunity: &ArbOpportunity,
    size: Decimal,
    config: &AgentConfig,
    context: &GateContext,
) -> Result<(), RejectReason> {
    if size < config.min_trade_size {
        return Err(RejectReason::BelowMinSize);
    }

    if let (Some(max_days), Some(resolves_at)) =
        (config.max_resolution_days, opportunity.resolves_at)
    {
        if resolves_at > Utc::now() + chrono::Duration::days(max_days) {
            return Err(RejectReason::ResolutionTooFar);
        }
    }

    if context.balance_a < size || context.balance_b < size {
        debug!(
            balance_a = %context.balance_a,
            balance_b = %context.balance_b,
            size = %size,
            "balance gate rejected"
        );
        return Err(RejectReason::InsufficientBalance);
    }

    if let Some(limit) = config.daily_loss_limit {
        if context.loss_today >= limit {
            return Err(RejectReason::DailyLossLimit);
        }
    }

    if let Some(max_trades) = config.max_total_trades {
        if context.trades_executed >= max_trades {
            return Err(RejectReason::MaxTradesReached);
        }
    }

    if let Some(duration_ms) = config.trading_duration_ms {
        let elapsed_ms = (Utc::now() - context.session_start).num_milliseconds();
        if elapsed_ms >= 0 && elapsed_ms as u64 >= duration_ms {
            return Err(RejectReason::SessionExpired);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbot_core::Venue;

    fn opportunity(total_cost: Decimal, liq_a: Decimal, liq_b: Decimal) -> ArbOpportunity {
        ArbOpportunity {
            market_id: "0xabc".to_string(),
            venue_a: Venue::Amm,
            venue_b: Venue::Clob,
            buy_yes_on_a: true,
            price_a: total_cost / dec!(2),
            price_b: total_cost / dec!(2),
            total_cost,
            guaranteed_payout: Decimal::ONE,
            gross_spread_bps: (Decimal::ONE - total_cost) * dec!(10_000),
            spread_bps: (Decimal::ONE - total_cost) * dec!(10_000),
            est_profit: Decimal::ZERO,
            liquidity_a: liq_a,
            liquidity_b: liq_b,
            resolves_at: None,
            detected_at: Utc::now(),
        }
    }

    fn context() -> GateContext {
        GateContext {
            session_start: Utc::now(),
            trades_executed: 0,
            loss_today: Decimal::ZERO,
            balance_a: dec!(1_000),
            balance_b: dec!(1_000),
        }
    }

    // ==================== Sizing Tests ====================

    #[test]
    fn test_liquidity_cap_limits_size() {
        // maxTradeSize/2 = 50, but venue A only shows 5 of liquidity:
        // the leg may consume at most 4.5.
        let config = AgentConfig::default().with_max_trade_size(dec!(100));
        let opp = opportunity(dec!(0.93), dec!(5), dec!(1_000));

        let size = position_size(&opp, &config, dec!(100_000));
        assert!(size <= dec!(4.5));
        assert!(size > Decimal::ZERO);
    }

    #[test]
    fn test_kelly_fraction_bounds_small_capital() {
        let config = AgentConfig::default().with_max_trade_size(dec!(1_000));
        let opp = opportunity(dec!(0.93), dec!(10_000), dec!(10_000));

        // b = 0.07/0.93; fraction = ((0.95b - 0.05)/b)/2.
        let b = dec!(0.07) / dec!(0.93);
        let expected = ((KELLY_WIN_PROB * b - KELLY_LOSS_PROB) / b) / dec!(2) * dec!(100);
        let size = position_size(&opp, &config, dec!(100));
        assert_eq!(size, expected);
    }

    #[test]
    fn test_no_edge_sizes_zero() {
        let config = AgentConfig::default();
        let opp = opportunity(dec!(1.0), dec!(100), dec!(100));
        assert_eq!(position_size(&opp, &config, dec!(1_000)), Decimal::ZERO);
    }

    #[test]
    fn test_zero_liquidity_sizes_zero() {
        let config = AgentConfig::default();
        let opp = opportunity(dec!(0.9), Decimal::ZERO, dec!(100));
        assert_eq!(position_size(&opp, &config, dec!(1_000)), Decimal::ZERO);
    }

    // ==================== Gate Tests ====================

    #[test]
    fn test_gate_accepts_clean_context() {
        let config = AgentConfig::default();
        let opp = opportunity(dec!(0.93), dec!(100), dec!(100));
        assert!(check(&opp, dec!(10), &config, &context()).is_ok());
    }

    #[test]
    fn test_gate_rejects_below_min_size() {
        let config = AgentConfig::default().with_min_trade_size(dec!(20));
        let opp = opportunity(dec!(0.93), dec!(100), dec!(100));
        assert_eq!(
            check(&opp, dec!(10), &config, &context()),
            Err(RejectReason::BelowMinSize)
        );
    }

    #[test]
    fn test_gate_rejects_far_resolution() {
        let mut config = AgentConfig::default();
        config.max_resolution_days = Some(7);
        let mut opp = opportunity(dec!(0.93), dec!(100), dec!(100));
        opp.resolves_at = Some(Utc::now() + chrono::Duration::days(30));

        assert_eq!(
            check(&opp, dec!(10), &config, &context()),
            Err(RejectReason::ResolutionTooFar)
        );

        opp.resolves_at = Some(Utc::now() + chrono::Duration::days(3));
        assert!(check(&opp, dec!(10), &config, &context()).is_ok());
    }

    #[test]
    fn test_gate_rejects_insufficient_balance() {
        let config = AgentConfig::default();
        let opp = opportunity(dec!(0.93), dec!(100), dec!(100));
        let mut ctx = context();
        ctx.balance_b = dec!(5);

        assert_eq!(
            check(&opp, dec!(10), &config, &ctx),
            Err(RejectReason::InsufficientBalance)
        );
    }

    #[test]
    fn test_gate_rejects_daily_loss_breach() {
        let config = AgentConfig::default().with_daily_loss_limit(dec!(50));
        let opp = opportunity(dec!(0.93), dec!(100), dec!(100));
        let mut ctx = context();
        ctx.loss_today = dec!(50);

        assert_eq!(
            check(&opp, dec!(10), &config, &ctx),
            Err(RejectReason::DailyLossLimit)
        );
    }

    #[test]
    fn test_gate_rejects_trade_cap() {
        let config = AgentConfig::default().with_max_total_trades(3);
        let opp = opportunity(dec!(0.93), dec!(100), dec!(100));
        let mut ctx = context();
        ctx.trades_executed = 3;

        assert_eq!(
            check(&opp, dec!(10), &config, &ctx),
            Err(RejectReason::MaxTradesReached)
        );
    }

    #[test]
    fn test_gate_rejects_expired_session() {
        let config = AgentConfig::default().with_trading_duration_ms(60_000);
        let opp = opportunity(dec!(0.93), dec!(100), dec!(100));
        let mut ctx = context();
        ctx.session_start = Utc::now() - chrono::Duration::minutes(2);

        assert_eq!(
            check(&opp, dec!(10), &config, &ctx),
            Err(RejectReason::SessionExpired)
        );
    }

    // ==================== Daily Loss Tracker Tests ====================

    #[test]
    fn test_loss_tracker_accumulates_losses() {
        let tracker = DailyLossTracker::new();
        tracker.record(dec!(-10));
        tracker.record(dec!(-5));
        assert_eq!(tracker.loss_today(), dec!(15));
    }

    #[test]
    fn test_loss_tracker_profits_offset() {
        let tracker = DailyLossTracker::new();
        tracker.record(dec!(20));
        tracker.record(dec!(-5));
        // Net positive day reads as zero loss.
        assert_eq!(tracker.loss_today(), Decimal::ZERO);
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(
            RejectReason::InsufficientBalance.as_str(),
            "insufficient_balance"
        );
        assert_eq!(RejectReason::SessionExpired.to_string(), "session_expired");
    }
}
