//! Shared types for cross-venue arbitrage operations.
//!
//! This module defines the data structures that flow between the quote
//! source, detector, executor, and position store: venue and side
//! identifiers, normalized order status, market quotes, opportunities,
//! and positions.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Wire Scales
// =============================================================================

/// Prices travel on the wire as integers scaled by 1e18.
pub const PRICE_WIRE_DECIMALS: u32 = 18;

/// Liquidities travel on the wire in stable-token base units (6 decimals).
pub const LIQUIDITY_WIRE_DECIMALS: u32 = 6;

/// Converts a 1e18-scaled wire price into a decimal ratio in [0, 1].
#[must_use]
pub fn price_from_atoms(atoms: u128) -> Decimal {
    Decimal::from_i128_with_scale(atoms as i128, PRICE_WIRE_DECIMALS)
        .normalize()
}

/// Converts a decimal price ratio into its 1e18-scaled wire form.
///
/// Returns `None` if the price is negative or too large to scale.
#[must_use]
pub fn price_to_atoms(price: Decimal) -> Option<u128> {
    if price < Decimal::ZERO {
        return None;
    }
    let scaled = price.checked_mul(Decimal::from(10u64.pow(PRICE_WIRE_DECIMALS)))?;
    scaled.trunc().to_u128()
}

/// Converts stable-token base units (6 decimals) into whole quote units.
#[must_use]
pub fn liquidity_from_atoms(atoms: u128) -> Decimal {
    Decimal::from_i128_with_scale(atoms as i128, LIQUIDITY_WIRE_DECIMALS).normalize()
}

/// Converts whole quote units into stable-token base units.
#[must_use]
pub fn liquidity_to_atoms(amount: Decimal) -> Option<u128> {
    if amount < Decimal::ZERO {
        return None;
    }
    let scaled = amount.checked_mul(Decimal::from(10u64.pow(LIQUIDITY_WIRE_DECIMALS)))?;
    scaled.trunc().to_u128()
}

// =============================================================================
// Venue Identifiers
// =============================================================================

/// Identifies which trading venue a quote, order, or leg belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Venue {
    /// The AMM-priced venue ("A"): signed-header REST orders.
    Amm,
    /// The order-book venue ("B"): session-token CLOB.
    Clob,
}

impl Venue {
    /// Returns the display name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amm => "amm",
            Self::Clob => "clob",
        }
    }

    /// Returns the other venue of the pair.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Amm => Self::Clob,
            Self::Clob => Self::Amm,
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Outcome and Side
// =============================================================================

/// One side of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The YES outcome token.
    Yes,
    /// The NO outcome token.
    No,
}

impl Outcome {
    /// Returns the opposite outcome.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }

    /// Returns the display string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy outcome tokens.
    Buy,
    /// Sell outcome tokens back.
    Sell,
}

impl Side {
    /// Returns the opposite side.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// =============================================================================
// Normalized Order Status
// =============================================================================

/// Normalized order status shared across venues.
///
/// Venue-specific vocabularies (`MATCHED`, `LIVE`, ...) are folded into
/// this closed set at the adapter boundary. `Unknown` marks a transient
/// status fetch failure and means "retry next poll".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Resting on the book, unfilled.
    Open,
    /// Completely filled.
    Filled,
    /// Partially filled, remainder still working.
    Partial,
    /// Cancelled before completion.
    Cancelled,
    /// Expired without filling.
    Expired,
    /// Status could not be determined this poll.
    Unknown,
}

impl OrderStatus {
    /// Returns true if no further transitions are expected.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Expired)
    }

    /// Returns true if the order reached a terminal state without filling.
    #[must_use]
    pub fn is_terminal_unfilled(self) -> bool {
        matches!(self, Self::Cancelled | Self::Expired)
    }

    /// Normalizes a venue status string into the closed set.
    ///
    /// Idempotent: the output's own name maps back to itself.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN" | "LIVE" | "RESTING" | "PENDING" | "NEW" => Self::Open,
            "FILLED" | "MATCHED" | "EXECUTED" | "COMPLETE" => Self::Filled,
            "PARTIAL" | "PARTIALLY_FILLED" | "PARTIAL_FILLED" => Self::Partial,
            "CANCELLED" | "CANCELED" | "UNMATCHED" => Self::Cancelled,
            "EXPIRED" | "TIMED_OUT" => Self::Expired,
            _ => Self::Unknown,
        }
    }

    /// Returns the canonical name of this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Filled => "FILLED",
            Self::Partial => "PARTIAL",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Market Quotes
// =============================================================================

/// Optional event metadata attached to a quote.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMeta {
    /// Human-readable market title.
    pub title: Option<String>,
    /// When the market resolves, if the venue exposes it.
    pub resolves_at: Option<DateTime<Utc>>,
}

/// One venue's two-sided view of one market. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketQuote {
    /// Venue that produced the quote.
    pub venue: Venue,
    /// Market identifier (32-byte hex on the wire).
    pub market_id: String,
    /// YES price as a decimal ratio in [0, 1] (18-dec wire scale).
    pub yes_price: Decimal,
    /// NO price as a decimal ratio in [0, 1].
    pub no_price: Decimal,
    /// Available YES-side liquidity in whole quote units.
    pub yes_liquidity: Decimal,
    /// Available NO-side liquidity in whole quote units.
    pub no_liquidity: Decimal,
    /// Optional event metadata.
    pub event: Option<EventMeta>,
}

impl MarketQuote {
    /// Returns the price of the given outcome.
    #[must_use]
    pub fn price(&self, outcome: Outcome) -> Decimal {
        match outcome {
            Outcome::Yes => self.yes_price,
            Outcome::No => self.no_price,
        }
    }

    /// Returns the liquidity behind the given outcome.
    #[must_use]
    pub fn liquidity(&self, outcome: Outcome) -> Decimal {
        match outcome {
            Outcome::Yes => self.yes_liquidity,
            Outcome::No => self.no_liquidity,
        }
    }

    /// Returns the market's resolution time, if known.
    #[must_use]
    pub fn resolves_at(&self) -> Option<DateTime<Utc>> {
        self.event.as_ref().and_then(|e| e.resolves_at)
    }
}

/// A refreshed view of market quotes across venues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    /// Monotonically increasing snapshot identifier.
    pub snapshot_id: u64,
    /// When the snapshot was produced.
    pub produced_at: DateTime<Utc>,
    /// Quotes obtained this cycle, possibly missing a failed venue.
    pub quotes: Vec<MarketQuote>,
}

impl QuoteSnapshot {
    /// Returns the quote a given venue published for a market, if any.
    #[must_use]
    pub fn quote(&self, market_id: &str, venue: Venue) -> Option<&MarketQuote> {
        self.quotes
            .iter()
            .find(|q| q.venue == venue && q.market_id == market_id)
    }

    /// Returns the distinct market ids present in this snapshot.
    #[must_use]
    pub fn market_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.quotes.iter().map(|q| q.market_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

// =============================================================================
// Arbitrage Opportunity
// =============================================================================

/// A directional pairing of outcome tokens across two venues.
///
/// `buy_yes_on_a = true` means buy YES on venue A and NO on venue B;
/// `false` means buy NO on venue A and YES on venue B. `price_a` and
/// `price_b` are the prices of whichever outcome is bought on each venue.
/// Derived from a snapshot; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbOpportunity {
    /// Market identifier.
    pub market_id: String,
    /// First venue of the pairing.
    pub venue_a: Venue,
    /// Second venue of the pairing.
    pub venue_b: Venue,
    /// Direction: true buys YES on venue A and NO on venue B.
    pub buy_yes_on_a: bool,
    /// Price of the outcome bought on venue A.
    pub price_a: Decimal,
    /// Price of the outcome bought on venue B.
    pub price_b: Decimal,
    /// Combined cost of both legs per unit payout.
    pub total_cost: Decimal,
    /// Guaranteed payout per unit at resolution (one quote unit).
    pub guaranteed_payout: Decimal,
    /// Spread before fees, in basis points.
    pub gross_spread_bps: Decimal,
    /// Spread net of venue fees and gas, in basis points.
    pub spread_bps: Decimal,
    /// Estimated profit; provisional (liquidity-bounded) at detection,
    /// recomputed once a size is chosen.
    pub est_profit: Decimal,
    /// Liquidity behind the bought outcome on venue A.
    pub liquidity_a: Decimal,
    /// Liquidity behind the bought outcome on venue B.
    pub liquidity_b: Decimal,
    /// Resolution time, if either venue exposed one.
    pub resolves_at: Option<DateTime<Utc>>,
    /// When the opportunity was detected.
    pub detected_at: DateTime<Utc>,
}

impl ArbOpportunity {
    /// Returns the outcome bought on venue A.
    #[must_use]
    pub fn outcome_a(&self) -> Outcome {
        if self.buy_yes_on_a {
            Outcome::Yes
        } else {
            Outcome::No
        }
    }

    /// Returns the outcome bought on venue B.
    #[must_use]
    pub fn outcome_b(&self) -> Outcome {
        self.outcome_a().opposite()
    }

    /// Returns true if the combined cost leaves a positive spread.
    #[must_use]
    pub fn is_profitable(&self) -> bool {
        self.total_cost < self.guaranteed_payout
    }

    /// Annualizes the net spread over the given default horizon.
    ///
    /// Uses the market's own resolution time when present, otherwise
    /// `default_horizon_days`.
    #[must_use]
    pub fn annualized_spread_bps(&self, default_horizon_days: i64) -> Decimal {
        let days = self
            .resolves_at
            .map(|t| {
                let d = (t - Utc::now()).num_days();
                d.max(1)
            })
            .unwrap_or(default_horizon_days.max(1));
        self.spread_bps * dec!(365) / Decimal::from(days)
    }
}

// =============================================================================
// Positions
// =============================================================================

/// One of the two orders constituting an arbitrage position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLeg {
    /// Venue the leg was placed on.
    pub venue: Venue,
    /// Venue-assigned order id.
    pub order_id: String,
    /// Outcome token the leg trades.
    pub token_id: String,
    /// Order direction.
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Requested size in whole quote units.
    pub size: Decimal,
    /// True once the leg is considered filled.
    pub filled: bool,
    /// Filled size so far; never exceeds `size`.
    pub filled_size: Decimal,
}

impl PositionLeg {
    /// Creates an unfilled leg.
    #[must_use]
    pub fn new(
        venue: Venue,
        order_id: impl Into<String>,
        token_id: impl Into<String>,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Self {
        Self {
            venue,
            order_id: order_id.into(),
            token_id: token_id.into(),
            side,
            price,
            size,
            filled: false,
            filled_size: Decimal::ZERO,
        }
    }

    /// Marks the leg filled, clamping `filled_size` to `size`.
    pub fn mark_filled(&mut self, filled_size: Decimal) {
        self.filled = true;
        self.filled_size = filled_size.min(self.size);
    }

    /// Returns the notional cost of the filled portion.
    #[must_use]
    pub fn fill_cost(&self) -> Decimal {
        self.price * self.filled_size
    }
}

/// Lifecycle status of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    /// Both legs submitted, fills pending.
    Open,
    /// Both legs filled.
    Filled,
    /// Exactly one leg filled; the agent is net directional.
    Partial,
    /// Both legs terminal and unfilled.
    Expired,
    /// Settled or unwound.
    Closed,
}

impl PositionStatus {
    /// Returns true if the position needs no further driving.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Expired | Self::Closed)
    }

    /// Returns the canonical name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Filled => "FILLED",
            Self::Partial => "PARTIAL",
            Self::Expired => "EXPIRED",
            Self::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A two-legged arbitrage position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Unique position identifier.
    pub id: Uuid,
    /// Owning user.
    pub user_id: String,
    /// Market identifier.
    pub market_id: String,
    /// Leg on venue A.
    pub leg_a: PositionLeg,
    /// Leg on venue B.
    pub leg_b: PositionLeg,
    /// Current lifecycle status.
    pub status: PositionStatus,
    /// Combined cost of both legs at submission.
    pub total_cost: Decimal,
    /// Payout at resolution if both legs fill.
    pub expected_payout: Decimal,
    /// Net spread captured, in basis points.
    pub spread_bps: Decimal,
    /// When the position was opened.
    pub opened_at: DateTime<Utc>,
    /// When the position reached a closed state, if it has.
    pub closed_at: Option<DateTime<Utc>>,
    /// Realized profit or loss; `None` until CLOSED.
    pub pnl: Option<Decimal>,
}

impl Position {
    /// Creates a new position in OPEN with both legs submitted.
    #[must_use]
    pub fn open(
        user_id: impl Into<String>,
        market_id: impl Into<String>,
        leg_a: PositionLeg,
        leg_b: PositionLeg,
        total_cost: Decimal,
        expected_payout: Decimal,
        spread_bps: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            market_id: market_id.into(),
            leg_a,
            leg_b,
            status: PositionStatus::Open,
            total_cost,
            expected_payout,
            spread_bps,
            opened_at: Utc::now(),
            closed_at: None,
            pnl: None,
        }
    }

    /// Returns the filled leg when exactly one leg has filled.
    #[must_use]
    pub fn filled_leg(&self) -> Option<&PositionLeg> {
        match (self.leg_a.filled, self.leg_b.filled) {
            (true, false) => Some(&self.leg_a),
            (false, true) => Some(&self.leg_b),
            _ => None,
        }
    }

    /// Returns the unfilled leg when exactly one leg has filled.
    #[must_use]
    pub fn unfilled_leg(&self) -> Option<&PositionLeg> {
        match (self.leg_a.filled, self.leg_b.filled) {
            (true, false) => Some(&self.leg_b),
            (false, true) => Some(&self.leg_a),
            _ => None,
        }
    }

    /// Checks the status/leg consistency invariant.
    ///
    /// FILLED and PARTIAL require at least one filled leg; EXPIRED
    /// requires both unfilled.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        match self.status {
            PositionStatus::Filled | PositionStatus::Partial => {
                self.leg_a.filled || self.leg_b.filled
            }
            PositionStatus::Expired => !self.leg_a.filled && !self.leg_b.filled,
            _ => true,
        }
    }
}

/// The key under which at most one execution runs concurrently.
#[must_use]
pub fn fingerprint(user_id: &str, market_id: &str) -> String {
    format!("{user_id}:{market_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Wire Scale Tests ====================

    #[test]
    fn test_price_from_atoms() {
        // 0.45 * 1e18
        let price = price_from_atoms(450_000_000_000_000_000);
        assert_eq!(price, dec!(0.45));
    }

    #[test]
    fn test_price_round_trip() {
        let atoms = 123_450_000_000_000_000u128;
        let price = price_from_atoms(atoms);
        assert_eq!(price_to_atoms(price), Some(atoms));
    }

    #[test]
    fn test_price_to_atoms_rejects_negative() {
        assert!(price_to_atoms(dec!(-0.1)).is_none());
    }

    #[test]
    fn test_liquidity_from_atoms() {
        // 5 USDT in 6-dec base units
        assert_eq!(liquidity_from_atoms(5_000_000), dec!(5));
        assert_eq!(liquidity_to_atoms(dec!(4.5)), Some(4_500_000));
    }

    // ==================== Venue / Outcome / Side Tests ====================

    #[test]
    fn test_venue_other() {
        assert_eq!(Venue::Amm.other(), Venue::Clob);
        assert_eq!(Venue::Clob.other(), Venue::Amm);
    }

    #[test]
    fn test_venue_ordering_is_deterministic() {
        assert!(Venue::Amm < Venue::Clob);
    }

    #[test]
    fn test_outcome_opposite() {
        assert_eq!(Outcome::Yes.opposite(), Outcome::No);
        assert_eq!(Outcome::No.opposite(), Outcome::Yes);
    }

    #[test]
    fn test_side_display() {
        assert_eq!(format!("{}", Side::Buy), "BUY");
        assert_eq!(format!("{}", Side::Sell), "SELL");
    }

    // ==================== Order Status Tests ====================

    #[test]
    fn test_normalize_venue_vocabulary() {
        assert_eq!(OrderStatus::normalize("MATCHED"), OrderStatus::Filled);
        assert_eq!(OrderStatus::normalize("LIVE"), OrderStatus::Open);
        assert_eq!(OrderStatus::normalize("canceled"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::normalize("garbage"), OrderStatus::Unknown);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["MATCHED", "LIVE", "partial", "EXPIRED", "nonsense", "OPEN"] {
            let once = OrderStatus::normalize(raw);
            let twice = OrderStatus::normalize(once.as_str());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_terminal_classification() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal_unfilled());
        assert!(!OrderStatus::Open.is_terminal());
        assert!(!OrderStatus::Unknown.is_terminal());
        assert!(!OrderStatus::Partial.is_terminal());
    }

    // ==================== Quote Tests ====================

    fn sample_quote(venue: Venue) -> MarketQuote {
        MarketQuote {
            venue,
            market_id: "0xabc".to_string(),
            yes_price: dec!(0.45),
            no_price: dec!(0.52),
            yes_liquidity: dec!(100),
            no_liquidity: dec!(80),
            event: None,
        }
    }

    #[test]
    fn test_quote_accessors() {
        let quote = sample_quote(Venue::Amm);
        assert_eq!(quote.price(Outcome::Yes), dec!(0.45));
        assert_eq!(quote.price(Outcome::No), dec!(0.52));
        assert_eq!(quote.liquidity(Outcome::No), dec!(80));
    }

    #[test]
    fn test_snapshot_lookup() {
        let snapshot = QuoteSnapshot {
            snapshot_id: 1,
            produced_at: Utc::now(),
            quotes: vec![sample_quote(Venue::Amm), sample_quote(Venue::Clob)],
        };

        assert!(snapshot.quote("0xabc", Venue::Amm).is_some());
        assert!(snapshot.quote("0xdef", Venue::Amm).is_none());
        assert_eq!(snapshot.market_ids(), vec!["0xabc".to_string()]);
    }

    // ==================== Opportunity Tests ====================

    fn sample_opportunity() -> ArbOpportunity {
        ArbOpportunity {
            market_id: "0xabc".to_string(),
            venue_a: Venue::Amm,
            venue_b: Venue::Clob,
            buy_yes_on_a: true,
            price_a: dec!(0.45),
            price_b: dec!(0.48),
            total_cost: dec!(0.93),
            guaranteed_payout: Decimal::ONE,
            gross_spread_bps: dec!(700),
            spread_bps: dec!(620),
            est_profit: dec!(5.6),
            liquidity_a: dec!(100),
            liquidity_b: dec!(80),
            resolves_at: None,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_opportunity_outcomes() {
        let opp = sample_opportunity();
        assert_eq!(opp.outcome_a(), Outcome::Yes);
        assert_eq!(opp.outcome_b(), Outcome::No);

        let mut reversed = opp.clone();
        reversed.buy_yes_on_a = false;
        assert_eq!(reversed.outcome_a(), Outcome::No);
        assert_eq!(reversed.outcome_b(), Outcome::Yes);
    }

    #[test]
    fn test_opportunity_profitable() {
        let opp = sample_opportunity();
        assert!(opp.is_profitable());
    }

    #[test]
    fn test_annualized_spread_uses_default_horizon() {
        let opp = sample_opportunity();
        // 620 bps over 30 days, annualized
        let annualized = opp.annualized_spread_bps(30);
        assert_eq!(annualized, dec!(620) * dec!(365) / dec!(30));
    }

    // ==================== Position Tests ====================

    fn sample_position() -> Position {
        let leg_a = PositionLeg::new(Venue::Amm, "a1", "yes-token", Side::Buy, dec!(0.45), dec!(10));
        let leg_b = PositionLeg::new(Venue::Clob, "b1", "no-token", Side::Buy, dec!(0.48), dec!(10));
        Position::open("user-1", "0xabc", leg_a, leg_b, dec!(9.3), dec!(10), dec!(620))
    }

    #[test]
    fn test_position_opens_with_status_open() {
        let position = sample_position();
        assert_eq!(position.status, PositionStatus::Open);
        assert!(position.closed_at.is_none());
        assert!(position.pnl.is_none());
    }

    #[test]
    fn test_leg_mark_filled_clamps() {
        let mut leg = PositionLeg::new(Venue::Amm, "a1", "t", Side::Buy, dec!(0.5), dec!(10));
        leg.mark_filled(dec!(12));
        assert!(leg.filled);
        assert_eq!(leg.filled_size, dec!(10));
    }

    #[test]
    fn test_filled_and_unfilled_leg_selection() {
        let mut position = sample_position();
        assert!(position.filled_leg().is_none());

        position.leg_a.mark_filled(dec!(10));
        assert_eq!(position.filled_leg().unwrap().order_id, "a1");
        assert_eq!(position.unfilled_leg().unwrap().order_id, "b1");

        position.leg_b.mark_filled(dec!(10));
        assert!(position.filled_leg().is_none());
    }

    #[test]
    fn test_position_invariants() {
        let mut position = sample_position();
        position.status = PositionStatus::Expired;
        assert!(position.invariants_hold());

        position.leg_a.mark_filled(dec!(10));
        assert!(!position.invariants_hold());

        position.status = PositionStatus::Partial;
        assert!(position.invariants_hold());
    }

    #[test]
    fn test_fingerprint_format() {
        assert_eq!(fingerprint("user-1", "0xabc"), "user-1:0xabc");
    }

    // ==================== Serialization Tests ====================

    #[test]
    fn test_quote_serialization() {
        let quote = sample_quote(Venue::Clob);
        let json = serde_json::to_string(&quote).unwrap();
        let back: MarketQuote = serde_json::from_str(&json).unwrap();
        assert_eq!(back.venue, Venue::Clob);
        assert_eq!(back.yes_price, dec!(0.45));
    }

    #[test]
    fn test_position_serialization() {
        let position = sample_position();
        let json = serde_json::to_string(&position).unwrap();
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, position.id);
        assert_eq!(back.status, PositionStatus::Open);
        assert_eq!(back.leg_b.token_id, "no-token");
    }
}
