//! Scripted venue doubles for executor and agent tests.
//!
//! [`ScriptedAdapter`] replays queued placement results and status
//! reports while recording every call, letting tests drive the executor
//! through fills, rejections, timeouts, and unwinds without a venue.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};

use arbot_core::adapter::{
    OpenOrder, OrderRequest, OrderStatusReport, PlaceOrderResult, QuoteFeed, VenueAdapter,
};
use arbot_core::{MarketQuote, OrderStatus, Venue, VenueError};

// =============================================================================
// Scripted Adapter
// =============================================================================

/// A venue adapter that replays scripted responses.
pub struct ScriptedAdapter {
    venue: Venue,
    place_results: Mutex<VecDeque<PlaceOrderResult>>,
    statuses: Mutex<HashMap<String, VecDeque<OrderStatusReport>>>,
    balance: Mutex<Decimal>,
    cancel_ok: bool,
    approvals_calls: AtomicU32,
    /// Every placement request received, in order.
    pub placed: Mutex<Vec<OrderRequest>>,
    /// Every `(order_id, token_id)` cancellation received, in order.
    pub cancelled: Mutex<Vec<(String, String)>>,
    /// Number of status fetches served.
    pub status_calls: AtomicU32,
}

impl std::fmt::Debug for ScriptedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedAdapter")
            .field("venue", &self.venue)
            .finish_non_exhaustive()
    }
}

impl ScriptedAdapter {
    /// Creates an adapter with a generous default balance.
    #[must_use]
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            place_results: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(HashMap::new()),
            balance: Mutex::new(dec!(1_000_000)),
            cancel_ok: true,
            approvals_calls: AtomicU32::new(0),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            status_calls: AtomicU32::new(0),
        }
    }

    /// Queues a placement result.
    #[must_use]
    pub fn with_place_result(self, result: PlaceOrderResult) -> Self {
        self.place_results.lock().push_back(result);
        self
    }

    /// Queues the status sequence for an order. The last entry repeats
    /// once the queue drains, so polls keep seeing a stable answer.
    #[must_use]
    pub fn with_statuses(self, order_id: &str, reports: Vec<OrderStatusReport>) -> Self {
        self.statuses
            .lock()
            .insert(order_id.to_string(), reports.into());
        self
    }

    /// Sets the reported stable balance.
    #[must_use]
    pub fn with_balance(self, balance: Decimal) -> Self {
        *self.balance.lock() = balance;
        self
    }

    /// Makes cancellations report failure.
    #[must_use]
    pub fn with_failing_cancel(mut self) -> Self {
        self.cancel_ok = false;
        self
    }

    /// Convenience: a status report.
    #[must_use]
    pub fn report(order_id: &str, status: OrderStatus, filled: Decimal) -> OrderStatusReport {
        OrderStatusReport {
            order_id: order_id.to_string(),
            status,
            filled_size: filled,
            remaining_size: Decimal::ZERO,
        }
    }

    /// Returns how many placements were received.
    #[must_use]
    pub fn placements(&self) -> usize {
        self.placed.lock().len()
    }

    /// Returns the cancelled order ids.
    #[must_use]
    pub fn cancelled_ids(&self) -> Vec<String> {
        self.cancelled.lock().iter().map(|(id, _)| id.clone()).collect()
    }
}

#[async_trait]
impl VenueAdapter for ScriptedAdapter {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn authenticate(&self) -> Result<(), VenueError> {
        Ok(())
    }

    async fn place_order(&self, request: &OrderRequest) -> PlaceOrderResult {
        self.placed.lock().push(request.clone());
        self.place_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| PlaceOrderResult::failed("no scripted placement"))
    }

    async fn cancel_order(&self, order_id: &str, token_id: &str) -> bool {
        self.cancelled
            .lock()
            .push((order_id.to_string(), token_id.to_string()));
        self.cancel_ok
    }

    async fn get_order_status(&self, order_id: &str) -> OrderStatusReport {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock();
        match statuses.get_mut(order_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| OrderStatusReport::unknown(order_id)),
            None => OrderStatusReport::unknown(order_id),
        }
    }

    async fn get_open_orders(&self) -> Vec<OpenOrder> {
        Vec::new()
    }

    async fn ensure_approvals(&self) -> bool {
        self.approvals_calls.fetch_add(1, Ordering::SeqCst) == 0
    }

    async fn get_balance(&self) -> Result<Decimal, VenueError> {
        Ok(*self.balance.lock())
    }
}

// =============================================================================
// Scripted Feed
// =============================================================================

/// A quote feed that returns fixed quotes or a scripted failure.
pub struct ScriptedFeed {
    venue: Venue,
    quotes: Mutex<Vec<MarketQuote>>,
    fail: bool,
}

impl ScriptedFeed {
    /// Creates an empty feed.
    #[must_use]
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            quotes: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// Adds a symmetric-liquidity quote.
    #[must_use]
    pub fn with_quote(
        self,
        market_id: &str,
        yes_price: Decimal,
        no_price: Decimal,
        liquidity: Decimal,
    ) -> Self {
        self.quotes.lock().push(MarketQuote {
            venue: self.venue,
            market_id: market_id.to_string(),
            yes_price,
            no_price,
            yes_liquidity: liquidity,
            no_liquidity: liquidity,
            event: None,
        });
        self
    }

    /// Makes every fetch fail.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl QuoteFeed for ScriptedFeed {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn fetch_quotes(&self, _market_ids: &[String]) -> Result<Vec<MarketQuote>, VenueError> {
        if self.fail {
            return Err(VenueError::Transport("scripted failure".to_string()));
        }
        Ok(self.quotes.lock().clone())
    }
}
