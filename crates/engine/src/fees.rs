//! Fee and gas estimation for cross-venue executions.
//!
//! A two-legged execution pays each venue's trading fee plus the gas for
//! the on-chain settlement path, converted into quote units through a
//! config-supplied static rate. Live gas quoting is a future extension.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use arbot_core::Venue;

/// Gas units one execution is budgeted to consume.
pub const EXECUTION_GAS_UNITS: u64 = 400_000;

/// Wei per native token.
const WEI_PER_NATIVE: Decimal = dec!(1_000_000_000_000_000_000);

// =============================================================================
// Fee Configuration
// =============================================================================

/// Fee rates and gas assumptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// AMM venue trading fee rate (decimal, e.g. 0.002 for 0.2%).
    pub amm_fee_rate: Decimal,
    /// CLOB venue trading fee rate.
    pub clob_fee_rate: Decimal,
    /// Static gas price in wei.
    pub gas_price_wei: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            amm_fee_rate: dec!(0.002),
            clob_fee_rate: dec!(0.001),
            gas_price_wei: 30_000_000_000,
        }
    }
}

impl FeeConfig {
    /// Returns the trading fee rate for a venue.
    #[must_use]
    pub fn rate_for(&self, venue: Venue) -> Decimal {
        match venue {
            Venue::Amm => self.amm_fee_rate,
            Venue::Clob => self.clob_fee_rate,
        }
    }
}

// =============================================================================
// Fee Breakdown
// =============================================================================

/// Fees for one notional unit of a two-legged execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionFees {
    /// Fee on the venue-A leg.
    pub venue_a_fee: Decimal,
    /// Fee on the venue-B leg.
    pub venue_b_fee: Decimal,
    /// Gas estimate in quote units.
    pub gas_cost: Decimal,
}

impl ExecutionFees {
    /// Total fee load in quote units.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.venue_a_fee + self.venue_b_fee + self.gas_cost
    }
}

// =============================================================================
// Fee Calculator
// =============================================================================

/// Computes per-execution fee loads.
#[derive(Debug, Clone, Default)]
pub struct FeeCalculator {
    config: FeeConfig,
}

impl FeeCalculator {
    /// Creates a calculator with default rates.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a calculator with custom rates.
    #[must_use]
    pub fn with_config(config: FeeConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &FeeConfig {
        &self.config
    }

    /// Estimates gas in quote units: `gas_price * 400_000 * rate / 1e18`.
    ///
    /// `gas_to_quote_rate` is the native-token price in quote units.
    #[must_use]
    pub fn gas_cost(&self, gas_to_quote_rate: Decimal) -> Decimal {
        Decimal::from(self.config.gas_price_wei) * Decimal::from(EXECUTION_GAS_UNITS)
            * gas_to_quote_rate
            / WEI_PER_NATIVE
    }

    /// Computes the fees of buying `price_a` on one venue and `price_b`
    /// on the other for one unit of payout.
    #[must_use]
    pub fn execution_fees(
        &self,
        venue_a: Venue,
        price_a: Decimal,
        venue_b: Venue,
        price_b: Decimal,
        gas_to_quote_rate: Decimal,
    ) -> ExecutionFees {
        ExecutionFees {
            venue_a_fee: price_a * self.config.rate_for(venue_a),
            venue_b_fee: price_b * self.config.rate_for(venue_b),
            gas_cost: self.gas_cost(gas_to_quote_rate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_cost_formula() {
        let calculator = FeeCalculator::with_config(FeeConfig {
            gas_price_wei: 30_000_000_000,
            ..Default::default()
        });
        // 30 gwei * 400k gas = 0.012 native; at 0.50 quote per native
        // that is 0.006 quote units.
        assert_eq!(calculator.gas_cost(dec!(0.50)), dec!(0.006));
    }

    #[test]
    fn test_execution_fees_total() {
        let calculator = FeeCalculator::with_config(FeeConfig {
            amm_fee_rate: dec!(0.002),
            clob_fee_rate: dec!(0.001),
            gas_price_wei: 0,
        });
        let fees = calculator.execution_fees(
            Venue::Amm,
            dec!(0.45),
            Venue::Clob,
            dec!(0.48),
            dec!(0.50),
        );

        assert_eq!(fees.venue_a_fee, dec!(0.0009));
        assert_eq!(fees.venue_b_fee, dec!(0.00048));
        assert_eq!(fees.gas_cost, Decimal::ZERO);
        assert_eq!(fees.total(), dec!(0.00138));
    }

    #[test]
    fn test_rate_lookup_by_venue() {
        let config = FeeConfig::default();
        assert_eq!(config.rate_for(Venue::Amm), config.amm_fee_rate);
        assert_eq!(config.rate_for(Venue::Clob), config.clob_fee_rate);
    }
}
