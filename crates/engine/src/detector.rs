//! Opportunity detection over quote snapshots.
//!
//! For every market quoted on both venues the detector emits the two
//! directional pairings (YES on A + NO on B, NO on A + YES on B), keeps
//! those whose combined cost is below the guaranteed payout, nets out
//! fees and gas, filters against the configured spread floor, and ranks
//! the survivors by annualized yield.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{debug, trace};

use arbot_core::{ArbOpportunity, MarketQuote, QuoteSnapshot, Venue};
use chrono::Utc;

use crate::catalog::MarketCatalog;
use crate::fees::FeeCalculator;

/// Horizon assumed for markets that do not expose a resolution time.
pub const DEFAULT_HORIZON_DAYS: i64 = 30;

/// Basis points per unit.
const BPS: Decimal = dec!(10_000);

/// Detects and ranks arbitrage opportunities.
#[derive(Debug)]
pub struct Detector {
    fees: FeeCalculator,
    default_horizon_days: i64,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(FeeCalculator::new())
    }
}

impl Detector {
    /// Creates a detector with the given fee model.
    #[must_use]
    pub fn new(fees: FeeCalculator) -> Self {
        Self {
            fees,
            default_horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }

    /// Overrides the default resolution horizon.
    #[must_use]
    pub fn with_default_horizon_days(mut self, days: i64) -> Self {
        self.default_horizon_days = days;
        self
    }

    /// Returns the fee calculator.
    #[must_use]
    pub fn fees(&self) -> &FeeCalculator {
        &self.fees
    }

    /// Produces the ranked opportunity list for a snapshot.
    ///
    /// `min_spread_bps` is the net-spread floor; `gas_to_quote_rate`
    /// converts the gas estimate into quote units.
    #[must_use]
    pub fn detect(
        &self,
        snapshot: &QuoteSnapshot,
        catalog: &Arc<MarketCatalog>,
        min_spread_bps: Decimal,
        gas_to_quote_rate: Decimal,
    ) -> Vec<ArbOpportunity> {
        let mut opportunities = Vec::new();

        for market_id in snapshot.market_ids() {
            let Some(amm) = snapshot.quote(&market_id, Venue::Amm) else {
                continue;
            };
            let Some(clob) = snapshot.quote(&market_id, Venue::Clob) else {
                continue;
            };

            for buy_yes_on_a in [true, false] {
                if let Some(opportunity) = self.evaluate(
                    &market_id,
                    amm,
                    clob,
                    buy_yes_on_a,
                    catalog,
                    min_spread_bps,
                    gas_to_quote_rate,
                ) {
                    opportunities.push(opportunity);
                }
            }
        }

        // Rank by annualized yield, then estimated profit, then venue
        // pair and market id so equal candidates order deterministically.
        let horizon = self.default_horizon_days;
        opportunities.sort_by_key(|o| {
            (
                Reverse(o.annualized_spread_bps(horizon)),
                Reverse(o.est_profit),
                o.venue_a.as_str(),
                o.venue_b.as_str(),
                o.market_id.clone(),
                o.buy_yes_on_a,
            )
        });

        debug!(
            snapshot_id = snapshot.snapshot_id,
            candidates = opportunities.len(),
            "detection complete"
        );
        opportunities
    }

    /// Evaluates one directional candidate.
    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        &self,
        market_id: &str,
        amm: &MarketQuote,
        clob: &MarketQuote,
        buy_yes_on_a: bool,
        catalog: &Arc<MarketCatalog>,
        min_spread_bps: Decimal,
        gas_to_quote_rate: Decimal,
    ) -> Option<ArbOpportunity> {
        let (price_a, liquidity_a, price_b, liquidity_b) = if buy_yes_on_a {
            (amm.yes_price, amm.yes_liquidity, clob.no_price, clob.no_liquidity)
        } else {
            (amm.no_price, amm.no_liquidity, clob.yes_price, clob.yes_liquidity)
        };

        // A zero price means that side of the book is empty.
        if price_a <= Decimal::ZERO || price_b <= Decimal::ZERO {
            return None;
        }

        let total_cost = price_a + price_b;
        if total_cost >= Decimal::ONE {
            trace!(
                market_id,
                buy_yes_on_a,
                total_cost = %total_cost,
                "combined cost at or above payout"
            );
            return None;
        }

        let gross_spread_bps = (Decimal::ONE - total_cost) * BPS;
        let fees = self.fees.execution_fees(
            Venue::Amm,
            price_a,
            Venue::Clob,
            price_b,
            gas_to_quote_rate,
        );
        let spread_bps = gross_spread_bps - fees.total() / total_cost * BPS;

        if spread_bps < min_spread_bps {
            trace!(
                market_id,
                buy_yes_on_a,
                gross_spread_bps = %gross_spread_bps,
                spread_bps = %spread_bps,
                "net spread below floor"
            );
            return None;
        }

        let resolves_at = catalog
            .resolves_at(market_id)
            .or_else(|| amm.resolves_at())
            .or_else(|| clob.resolves_at());

        // Provisional profit estimate bounded by the thinner book; the
        // sizer recomputes it once a notional is chosen.
        let est_profit = (Decimal::ONE - total_cost) * liquidity_a.min(liquidity_b);

        Some(ArbOpportunity {
            market_id: market_id.to_string(),
            venue_a: Venue::Amm,
            venue_b: Venue::Clob,
            buy_yes_on_a,
            price_a,
            price_b,
            total_cost,
            guaranteed_payout: Decimal::ONE,
            gross_spread_bps,
            spread_bps,
            est_profit,
            liquidity_a,
            liquidity_b,
            resolves_at,
            detected_at: Utc::now(),
        })
    }
}
