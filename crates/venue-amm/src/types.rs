//! Raw wire shapes for the AMM venue and their conversions into the
//! normalized core types.

use rust_decimal::Decimal;
use serde::Deserialize;

use arbot_core::types::{liquidity_from_atoms, price_from_atoms, EventMeta, MarketQuote, Venue};
use arbot_core::{OpenOrder, OrderStatus, OrderStatusReport, Side};

/// Response to an order placement.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlaceResponse {
    /// Venue-assigned order id.
    pub order_id: Option<String>,
    /// Venue-vocabulary status string.
    pub status: Option<String>,
    /// Business error, when rejected.
    pub error: Option<String>,
}

/// Response to an order status fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOrderStatus {
    pub order_id: String,
    pub status: Option<String>,
    pub filled_size: Option<Decimal>,
    pub remaining_size: Option<Decimal>,
}

impl From<RawOrderStatus> for OrderStatusReport {
    fn from(raw: RawOrderStatus) -> Self {
        let status = raw
            .status
            .as_deref()
            .map_or(OrderStatus::Unknown, OrderStatus::normalize);
        Self {
            order_id: raw.order_id,
            status,
            filled_size: raw.filled_size.unwrap_or(Decimal::ZERO),
            remaining_size: raw.remaining_size.unwrap_or(Decimal::ZERO),
        }
    }
}

/// Response to an open-orders listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOpenOrdersResponse {
    pub orders: Option<Vec<RawOpenOrder>>,
}

/// One resting order as the venue reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOpenOrder {
    pub order_id: String,
    pub token_id: String,
    pub side: Option<String>,
    pub price: Option<Decimal>,
    pub size: Option<Decimal>,
}

impl From<RawOpenOrder> for OpenOrder {
    fn from(raw: RawOpenOrder) -> Self {
        let side = match raw.side.as_deref() {
            Some("SELL" | "sell") => Side::Sell,
            _ => Side::Buy,
        };
        Self {
            order_id: raw.order_id,
            token_id: raw.token_id,
            side,
            price: raw.price.unwrap_or(Decimal::ZERO),
            size: raw.size.unwrap_or(Decimal::ZERO),
        }
    }
}

/// Response to a balance fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBalanceResponse {
    pub balance: Option<Decimal>,
}

/// One market's book as the venue reports it. Prices are 1e18-scaled
/// integers, liquidities 6-decimal stable base units.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMarketBook {
    pub market_id: String,
    pub yes_price: u128,
    pub no_price: u128,
    pub yes_liquidity: u128,
    pub no_liquidity: u128,
    pub title: Option<String>,
    pub resolves_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RawMarketBook {
    /// Converts the wire book into a normalized quote.
    #[must_use]
    pub fn into_quote(self) -> MarketQuote {
        let event = if self.title.is_some() || self.resolves_at.is_some() {
            Some(EventMeta {
                title: self.title,
                resolves_at: self.resolves_at,
            })
        } else {
            None
        };
        MarketQuote {
            venue: Venue::Amm,
            market_id: self.market_id,
            yes_price: price_from_atoms(self.yes_price),
            no_price: price_from_atoms(self.no_price),
            yes_liquidity: liquidity_from_atoms(self.yes_liquidity),
            no_liquidity: liquidity_from_atoms(self.no_liquidity),
            event,
        }
    }
}

/// Response to a markets fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMarketsResponse {
    pub markets: Option<Vec<RawMarketBook>>,
}
