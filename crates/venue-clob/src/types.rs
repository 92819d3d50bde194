//! Raw wire shapes for the CLOB venue.
//!
//! The venue speaks its own vocabulary (`LIVE`, `MATCHED`, `UNMATCHED`,
//! camelCase fields); everything is folded into the normalized core
//! types here.

use rust_decimal::Decimal;
use serde::Deserialize;

use arbot_core::types::{liquidity_from_atoms, price_from_atoms, EventMeta, MarketQuote, Venue};
use arbot_core::{OpenOrder, OrderStatus, OrderStatusReport, Side};

/// Response to an order placement on `/orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClobPlaceResponse {
    /// Whether the order was accepted.
    pub success: Option<bool>,
    /// Venue-assigned order id.
    #[serde(rename = "orderID")]
    pub order_id: Option<String>,
    /// Venue-vocabulary status.
    pub status: Option<String>,
    /// Business error.
    #[serde(rename = "errorMsg")]
    pub error_msg: Option<String>,
}

/// Response to an order status fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClobOrderStatus {
    pub id: String,
    pub status: Option<String>,
    #[serde(rename = "size_matched")]
    pub size_matched: Option<Decimal>,
    #[serde(rename = "original_size")]
    pub original_size: Option<Decimal>,
}

impl From<RawClobOrderStatus> for OrderStatusReport {
    fn from(raw: RawClobOrderStatus) -> Self {
        let status = raw
            .status
            .as_deref()
            .map_or(OrderStatus::Unknown, OrderStatus::normalize);
        let filled = raw.size_matched.unwrap_or(Decimal::ZERO);
        let remaining = raw
            .original_size
            .map(|total| (total - filled).max(Decimal::ZERO))
            .unwrap_or(Decimal::ZERO);
        Self {
            order_id: raw.id,
            status,
            filled_size: filled,
            remaining_size: remaining,
        }
    }
}

/// Response to an open-orders listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClobOpenOrders {
    pub data: Option<Vec<RawClobOpenOrder>>,
}

/// One resting order.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClobOpenOrder {
    pub id: String,
    #[serde(rename = "asset_id")]
    pub asset_id: String,
    pub side: Option<String>,
    pub price: Option<Decimal>,
    pub size: Option<Decimal>,
}

impl From<RawClobOpenOrder> for OpenOrder {
    fn from(raw: RawClobOpenOrder) -> Self {
        let side = match raw.side.as_deref() {
            Some("SELL" | "sell") => Side::Sell,
            _ => Side::Buy,
        };
        Self {
            order_id: raw.id,
            token_id: raw.asset_id,
            side,
            price: raw.price.unwrap_or(Decimal::ZERO),
            size: raw.size.unwrap_or(Decimal::ZERO),
        }
    }
}

/// Response to a balance fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClobBalance {
    pub balance: Option<Decimal>,
}

/// One market's book summary. Wire scales match the quote schema:
/// prices 1e18, depths in 6-decimal stable base units.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClobBook {
    #[serde(rename = "market")]
    pub market_id: String,
    pub yes_price: u128,
    pub no_price: u128,
    pub yes_depth: u128,
    pub no_depth: u128,
    pub question: Option<String>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
}

impl RawClobBook {
    /// Converts the wire book into a normalized quote.
    #[must_use]
    pub fn into_quote(self) -> MarketQuote {
        let event = if self.question.is_some() || self.end_date.is_some() {
            Some(EventMeta {
                title: self.question,
                resolves_at: self.end_date,
            })
        } else {
            None
        };
        MarketQuote {
            venue: Venue::Clob,
            market_id: self.market_id,
            yes_price: price_from_atoms(self.yes_price),
            no_price: price_from_atoms(self.no_price),
            yes_liquidity: liquidity_from_atoms(self.yes_depth),
            no_liquidity: liquidity_from_atoms(self.no_depth),
            event,
        }
    }
}

/// Response to a books fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClobBooks {
    pub books: Option<Vec<RawClobBook>>,
}
