//! The uniform venue adapter contract.
//!
//! Both venue clients implement [`VenueAdapter`]: a closed method set for
//! order placement, cancellation, status, open orders, approvals, and
//! balance. Venue-specific semantics (auth scheme, status vocabulary,
//! signing) live behind this boundary.
//!
//! # Error model
//!
//! `place_order` never errors upward for transport failures: the outcome
//! is captured in [`PlaceOrderResult`]. `get_order_status` reports
//! [`OrderStatus::Unknown`](crate::types::OrderStatus::Unknown) on
//! transient fetch failures; callers retry next poll. `cancel_order` and
//! `get_open_orders` degrade to `false` / empty.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::VenueError;
use crate::types::{MarketQuote, OrderStatus, Side, Venue};

/// Order id reported by adapters running in dry-run mode.
pub const DRY_RUN_ORDER_ID: &str = "dry-run";

// =============================================================================
// Request / Result Types
// =============================================================================

/// Parameters for placing an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Market identifier.
    pub market_id: String,
    /// Outcome token to trade.
    pub token_id: String,
    /// Order direction.
    pub side: Side,
    /// Limit price in (0, 1).
    pub price: Decimal,
    /// Size in whole quote-currency units.
    pub size: Decimal,
}

/// Value-typed outcome of an order placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderResult {
    /// Whether the venue accepted the order.
    pub success: bool,
    /// Venue-assigned order id, when accepted.
    pub order_id: Option<String>,
    /// Status reported at submission, when the venue includes one.
    pub status: Option<OrderStatus>,
    /// Error description, when rejected or failed.
    pub error: Option<String>,
}

impl PlaceOrderResult {
    /// Creates an accepted result.
    #[must_use]
    pub fn accepted(order_id: impl Into<String>, status: Option<OrderStatus>) -> Self {
        Self {
            success: true,
            order_id: Some(order_id.into()),
            status,
            error: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            order_id: None,
            status: None,
            error: Some(error.into()),
        }
    }

    /// Creates the synthetic result returned in dry-run mode.
    #[must_use]
    pub fn dry_run() -> Self {
        Self {
            success: true,
            order_id: Some(DRY_RUN_ORDER_ID.to_string()),
            status: Some(OrderStatus::Filled),
            error: None,
        }
    }

    /// Returns true if the venue already reported a terminal fill.
    #[must_use]
    pub fn filled_at_submission(&self) -> bool {
        self.success && self.status == Some(OrderStatus::Filled)
    }
}

/// Normalized order status report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusReport {
    /// Order id the report refers to.
    pub order_id: String,
    /// Normalized status.
    pub status: OrderStatus,
    /// Size filled so far, in whole quote units.
    pub filled_size: Decimal,
    /// Size still working.
    pub remaining_size: Decimal,
}

impl OrderStatusReport {
    /// Creates the report used when a status fetch fails transiently.
    #[must_use]
    pub fn unknown(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            status: OrderStatus::Unknown,
            filled_size: Decimal::ZERO,
            remaining_size: Decimal::ZERO,
        }
    }

    /// Returns true if the order counts as filled for the given size.
    #[must_use]
    pub fn is_filled_for(&self, size: Decimal) -> bool {
        self.status == OrderStatus::Filled || self.filled_size >= size
    }
}

/// A resting order visible on a venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    /// Venue-assigned order id.
    pub order_id: String,
    /// Outcome token the order trades.
    pub token_id: String,
    /// Order direction.
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Remaining size.
    pub size: Decimal,
}

// =============================================================================
// Venue Adapter
// =============================================================================

/// Uniform order interface over one venue, bound to one user's signer.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Returns which venue this adapter fronts.
    fn venue(&self) -> Venue;

    /// Establishes a credential, or is a no-op for venues that sign
    /// per-request. Retried once by callers on 401-class failures.
    async fn authenticate(&self) -> Result<(), VenueError>;

    /// Places an order. Idempotent with respect to the adapter's client
    /// nonce, which increments only on success. Transport failures are
    /// returned in the result, never raised.
    async fn place_order(&self, request: &OrderRequest) -> PlaceOrderResult;

    /// Cancels an order. Best-effort; returns false on any failure.
    async fn cancel_order(&self, order_id: &str, token_id: &str) -> bool;

    /// Fetches the normalized status of an order. Transient failures
    /// yield `Unknown`.
    async fn get_order_status(&self, order_id: &str) -> OrderStatusReport;

    /// Lists resting orders; empty on failure.
    async fn get_open_orders(&self) -> Vec<OpenOrder>;

    /// Idempotently grants spending approvals to the venue's exchange
    /// contract. Logs and continues on failure. Returns true when any
    /// on-chain work was performed this call.
    async fn ensure_approvals(&self) -> bool;

    /// Returns the stable-token balance available on this venue.
    async fn get_balance(&self) -> Result<Decimal, VenueError>;
}

// =============================================================================
// Quote Feed
// =============================================================================

/// Read-only quote access over one venue, consumed by the quote source.
#[async_trait]
pub trait QuoteFeed: Send + Sync {
    /// Returns which venue this feed reads.
    fn venue(&self) -> Venue;

    /// Fetches the current two-sided quotes for the tracked markets.
    async fn fetch_quotes(&self, market_ids: &[String]) -> Result<Vec<MarketQuote>, VenueError>;
}
