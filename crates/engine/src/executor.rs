//! Two-legged order execution.
//!
//! The executor turns an (opportunity, size) pair into a position whose
//! legs are both filled, both dead, or cleanly unwound. At most one
//! execution runs per (user, market) fingerprint; a paused agent refuses
//! to execute at all. Legs are submitted concurrently and joined; if one
//! placement fails while the other succeeds, the survivor is cancelled
//! immediately.
//!
//! Execution attempt state machine:
//!
//! ```text
//! IDLE ─┬─ place(A,B) ─► BOTH_SUBMITTED ─┬─ both FILLED ─► FILLED
//!       │                                ├─ one FILLED, one UNFILLED ─► UNWINDING
//!       │                                └─ both UNFILLED terminal ─► EXPIRED
//!       ├─ A ok, B fail ─► CANCEL_A ─► FAILED
//!       └─ A fail, B ok ─► CANCEL_B ─► FAILED
//!
//! UNWINDING ─┬─ unwind FILLED ─► CLOSED (unpause)
//!            └─ unwind fails ─► PARTIAL (stay paused)
//! ```

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use arbot_core::adapter::{OrderRequest, OrderStatusReport, VenueAdapter};
use arbot_core::types::fingerprint;
use arbot_core::{
    AgentConfig, ArbOpportunity, OrderStatus, Position, PositionLeg, PositionStatus, Side, Venue,
};

use crate::catalog::MarketCatalog;
use crate::positions::PositionStore;

/// Pause reason set when a partial fill awaits its unwind.
pub const PAUSE_REASON_PARTIAL: &str = "partial_fill:awaiting_unwind";

/// Bound on unwind status polls.
const MAX_UNWIND_POLLS: u32 = 6;

// =============================================================================
// Pause State
// =============================================================================

/// Shared paused flag; set on unresolved partial fills, cleared only by
/// a filled unwind or operator action.
#[derive(Debug, Default)]
pub struct PauseState {
    reason: RwLock<Option<String>>,
}

impl PauseState {
    /// Creates an unpaused state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when executions are forbidden.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.reason.read().is_some()
    }

    /// Returns the pause reason, if paused.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Pauses with a reason.
    pub fn pause(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "agent paused");
        *self.reason.write() = Some(reason);
    }

    /// Clears the pause.
    pub fn clear(&self) {
        if self.reason.write().take().is_some() {
            info!("agent unpaused");
        }
    }
}

// =============================================================================
// Execution Outcome
// =============================================================================

/// Result of one execution attempt.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// Refused before placement; no orders were sent.
    Refused {
        /// Why the execution was refused.
        reason: String,
    },
    /// Placement failed; any surviving leg was cancelled, no position
    /// recorded.
    Failed {
        /// Why the execution failed.
        reason: String,
    },
    /// A position was recorded and reached a post-execution status.
    Completed {
        /// Position id.
        position_id: Uuid,
        /// Status after the attempt: FILLED, PARTIAL, EXPIRED, or CLOSED.
        status: PositionStatus,
        /// Realized PnL, when an unwind closed the position.
        pnl: Option<Decimal>,
    },
}

impl ExecutionOutcome {
    /// Returns true if both legs filled as intended.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        matches!(
            self,
            Self::Completed {
                status: PositionStatus::Filled,
                ..
            }
        )
    }

    /// Returns the realized PnL, if any.
    #[must_use]
    pub fn pnl(&self) -> Option<Decimal> {
        match self {
            Self::Completed { pnl, .. } => *pnl,
            _ => None,
        }
    }
}

/// Per-leg liveness tracked across fill polls.
#[derive(Debug, Clone, Copy, Default)]
struct LegState {
    filled: bool,
    dead: bool,
}

impl LegState {
    fn working(self) -> bool {
        !self.filled && !self.dead
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Executes opportunities for one agent.
pub struct Executor {
    user_id: String,
    venue_a: Arc<dyn VenueAdapter>,
    venue_b: Arc<dyn VenueAdapter>,
    catalog: Arc<MarketCatalog>,
    store: Arc<PositionStore>,
    pause: Arc<PauseState>,
    in_flight: Mutex<HashSet<String>>,
    shutdown: watch::Receiver<bool>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("user_id", &self.user_id)
            .field("paused", &self.pause.is_paused())
            .field("in_flight", &self.in_flight.lock().len())
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        venue_a: Arc<dyn VenueAdapter>,
        venue_b: Arc<dyn VenueAdapter>,
        catalog: Arc<MarketCatalog>,
        store: Arc<PositionStore>,
        pause: Arc<PauseState>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            venue_a,
            venue_b,
            catalog,
            store,
            pause,
            in_flight: Mutex::new(HashSet::new()),
            shutdown,
        }
    }

    /// Returns the pause state.
    #[must_use]
    pub fn pause_state(&self) -> &Arc<PauseState> {
        &self.pause
    }

    fn adapter_for(&self, venue: Venue) -> &Arc<dyn VenueAdapter> {
        match venue {
            Venue::Amm => &self.venue_a,
            Venue::Clob => &self.venue_b,
        }
    }

    /// Executes an opportunity at the given per-leg size.
    ///
    /// Refuses when paused or when an execution for the same
    /// (user, market) fingerprint is already in flight.
    pub async fn execute(
        &self,
        opportunity: &ArbOpportunity,
        size: Decimal,
        config: &AgentConfig,
    ) -> ExecutionOutcome {
        if let Some(reason) = self.pause.reason() {
            return ExecutionOutcome::Refused {
                reason: format!("paused: {reason}"),
            };
        }

        let key = fingerprint(&self.user_id, &opportunity.market_id);
        if !self.in_flight.lock().insert(key.clone()) {
            return ExecutionOutcome::Refused {
                reason: "execution already in flight for market".to_string(),
            };
        }
        let outcome = self.run(opportunity, size, config).await;
        self.in_flight.lock().remove(&key);
        outcome
    }

    async fn run(
        &self,
        opportunity: &ArbOpportunity,
        size: Decimal,
        config: &AgentConfig,
    ) -> ExecutionOutcome {
        // Resolve per-venue token ids before anything touches the wire.
        let Some(tokens_a) = self
            .catalog
            .tokens_for(&opportunity.market_id, opportunity.venue_a)
        else {
            return ExecutionOutcome::Refused {
                reason: format!("no token ids on {} for market", opportunity.venue_a),
            };
        };
        let Some(tokens_b) = self
            .catalog
            .tokens_for(&opportunity.market_id, opportunity.venue_b)
        else {
            return ExecutionOutcome::Refused {
                reason: format!("no token ids on {} for market", opportunity.venue_b),
            };
        };
        let token_a = tokens_a.token_for(opportunity.outcome_a()).to_string();
        let token_b = tokens_b.token_for(opportunity.outcome_b()).to_string();

        let request_a = OrderRequest {
            market_id: opportunity.market_id.clone(),
            token_id: token_a.clone(),
            side: Side::Buy,
            price: opportunity.price_a,
            size,
        };
        let request_b = OrderRequest {
            market_id: opportunity.market_id.clone(),
            token_id: token_b.clone(),
            side: Side::Buy,
            price: opportunity.price_b,
            size,
        };

        info!(
            market_id = %opportunity.market_id,
            buy_yes_on_a = opportunity.buy_yes_on_a,
            price_a = %opportunity.price_a,
            price_b = %opportunity.price_b,
            size = %size,
            "submitting both legs"
        );

        let adapter_a = self.adapter_for(opportunity.venue_a);
        let adapter_b = self.adapter_for(opportunity.venue_b);
        let (placed_a, placed_b) =
            tokio::join!(adapter_a.place_order(&request_a), adapter_b.place_order(&request_b));

        match (placed_a.success, placed_b.success) {
            (false, false) => {
                return ExecutionOutcome::Failed {
                    reason: format!(
                        "both placements failed: a={}, b={}",
                        placed_a.error.unwrap_or_default(),
                        placed_b.error.unwrap_or_default()
                    ),
                };
            }
            (true, false) => {
                // Cancel the survivor immediately; the agent must not sit
                // one-sided on a placement failure.
                if let Some(order_id) = &placed_a.order_id {
                    adapter_a.cancel_order(order_id, &token_a).await;
                }
                return ExecutionOutcome::Failed {
                    reason: format!(
                        "leg B placement failed: {}",
                        placed_b.error.unwrap_or_default()
                    ),
                };
            }
            (false, true) => {
                if let Some(order_id) = &placed_b.order_id {
                    adapter_b.cancel_order(order_id, &token_b).await;
                }
                return ExecutionOutcome::Failed {
                    reason: format!(
                        "leg A placement failed: {}",
                        placed_a.error.unwrap_or_default()
                    ),
                };
            }
            (true, true) => {}
        }

        let mut leg_a = PositionLeg::new(
            opportunity.venue_a,
            placed_a.order_id.clone().unwrap_or_default(),
            token_a,
            Side::Buy,
            opportunity.price_a,
            size,
        );
        let mut leg_b = PositionLeg::new(
            opportunity.venue_b,
            placed_b.order_id.clone().unwrap_or_default(),
            token_b,
            Side::Buy,
            opportunity.price_b,
            size,
        );
        if placed_a.filled_at_submission() {
            leg_a.mark_filled(size);
        }
        if placed_b.filled_at_submission() {
            leg_b.mark_filled(size);
        }

        let position = Position::open(
            self.user_id.clone(),
            opportunity.market_id.clone(),
            leg_a,
            leg_b,
            opportunity.total_cost * size,
            opportunity.guaranteed_payout * size,
            opportunity.spread_bps,
        );
        let position_id = position.id;
        let both_filled_at_submission = position.leg_a.filled && position.leg_b.filled;
        self.store.insert(position).await;

        let (state_a, state_b) = if both_filled_at_submission {
            // Terminal at submission; skip polling entirely.
            (
                LegState {
                    filled: true,
                    dead: false,
                },
                LegState {
                    filled: true,
                    dead: false,
                },
            )
        } else {
            self.poll_fills(position_id, config).await
        };

        self.classify(position_id, state_a, state_b, config).await
    }

    /// Polls both legs until a terminal combination or the poll budget
    /// runs out, then runs the final check.
    async fn poll_fills(&self, position_id: Uuid, config: &AgentConfig) -> (LegState, LegState) {
        let interval = Duration::from_millis(config.fill_poll_interval_ms);
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(config.fill_poll_timeout_ms);
        let mut shutdown = self.shutdown.clone();

        let mut state_a = LegState::default();
        let mut state_b = LegState::default();
        self.seed_states(position_id, &mut state_a, &mut state_b);

        loop {
            self.poll_tick(position_id, &mut state_a, &mut state_b).await;

            let settled = (state_a.filled || state_a.dead) && (state_b.filled || state_b.dead);
            if settled {
                return (state_a, state_b);
            }

            if tokio::time::Instant::now() >= deadline {
                // One last read to catch a fill that landed at the buzzer.
                self.poll_tick(position_id, &mut state_a, &mut state_b).await;
                return (state_a, state_b);
            }

            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    debug!(position_id = %position_id, "fill polling aborted by shutdown");
                    return (state_a, state_b);
                }
            }
        }
    }

    fn seed_states(&self, position_id: Uuid, state_a: &mut LegState, state_b: &mut LegState) {
        if let Some(position) = self.store.get(position_id) {
            state_a.filled = position.leg_a.filled;
            state_b.filled = position.leg_b.filled;
        }
    }

    /// One poll round: concurrent status fetches for every working leg.
    async fn poll_tick(&self, position_id: Uuid, state_a: &mut LegState, state_b: &mut LegState) {
        let Some(position) = self.store.get(position_id) else {
            return;
        };

        let fetch = |venue: Venue, order_id: String, active: bool| {
            let adapter = self.adapter_for(venue).clone();
            async move {
                if active {
                    Some(adapter.get_order_status(&order_id).await)
                } else {
                    None
                }
            }
        };

        let (report_a, report_b) = tokio::join!(
            fetch(
                position.leg_a.venue,
                position.leg_a.order_id.clone(),
                state_a.working(),
            ),
            fetch(
                position.leg_b.venue,
                position.leg_b.order_id.clone(),
                state_b.working(),
            )
        );

        if let Some(report) = report_a {
            self.apply_report(position_id, true, &position.leg_a, &report, state_a)
                .await;
        }
        if let Some(report) = report_b {
            self.apply_report(position_id, false, &position.leg_b, &report, state_b)
                .await;
        }
    }

    async fn apply_report(
        &self,
        position_id: Uuid,
        is_leg_a: bool,
        leg: &PositionLeg,
        report: &OrderStatusReport,
        state: &mut LegState,
    ) {
        match report.status {
            // Transient fetch failure: try again next poll.
            OrderStatus::Unknown => {}
            _ if report.is_filled_for(leg.size) => {
                state.filled = true;
                let filled_size = if report.filled_size > Decimal::ZERO {
                    report.filled_size
                } else {
                    leg.size
                };
                self.store
                    .update_legs(position_id, |position| {
                        let leg = if is_leg_a {
                            &mut position.leg_a
                        } else {
                            &mut position.leg_b
                        };
                        leg.mark_filled(filled_size);
                    })
                    .await;
            }
            OrderStatus::Cancelled | OrderStatus::Expired => {
                state.dead = true;
            }
            OrderStatus::Open | OrderStatus::Partial | OrderStatus::Filled => {}
        }
    }

    /// Maps the final leg states onto a position status and drives the
    /// unwind protocol when exactly one leg filled.
    async fn classify(
        &self,
        position_id: Uuid,
        state_a: LegState,
        state_b: LegState,
        config: &AgentConfig,
    ) -> ExecutionOutcome {
        let Some(position) = self.store.get(position_id) else {
            return ExecutionOutcome::Failed {
                reason: "position vanished during execution".to_string(),
            };
        };

        match (state_a.filled, state_b.filled) {
            (true, true) => {
                self.store
                    .set_status(position_id, PositionStatus::Filled, None, Some("both legs filled"))
                    .await;
                info!(position_id = %position_id, "position filled");
                ExecutionOutcome::Completed {
                    position_id,
                    status: PositionStatus::Filled,
                    pnl: None,
                }
            }
            (false, false) => {
                // Still-working legs are cancelled; dead ones get a
                // defensive cancel as well.
                let adapter_a = self.adapter_for(position.leg_a.venue);
                let adapter_b = self.adapter_for(position.leg_b.venue);
                tokio::join!(
                    adapter_a.cancel_order(&position.leg_a.order_id, &position.leg_a.token_id),
                    adapter_b.cancel_order(&position.leg_b.order_id, &position.leg_b.token_id)
                );
                self.store
                    .set_status(position_id, PositionStatus::Expired, None, Some("no leg filled"))
                    .await;
                ExecutionOutcome::Completed {
                    position_id,
                    status: PositionStatus::Expired,
                    pnl: None,
                }
            }
            _ => self.unwind(position_id, config).await,
        }
    }

    /// The unwind protocol for a one-sided position.
    ///
    /// Pauses the agent before anything else so no further executions
    /// start, cancels the dangling leg, then sells back the filled leg
    /// at its own price. The cancel and the unwind are independent
    /// best-effort operations.
    async fn unwind(&self, position_id: Uuid, config: &AgentConfig) -> ExecutionOutcome {
        self.pause.pause(PAUSE_REASON_PARTIAL);
        self.store
            .set_status(position_id, PositionStatus::Partial, None, Some("one leg filled"))
            .await;

        let Some(position) = self.store.get(position_id) else {
            return ExecutionOutcome::Completed {
                position_id,
                status: PositionStatus::Partial,
                pnl: None,
            };
        };
        let (Some(filled), Some(unfilled)) = (
            position.filled_leg().cloned(),
            position.unfilled_leg().cloned(),
        ) else {
            return ExecutionOutcome::Completed {
                position_id,
                status: PositionStatus::Partial,
                pnl: None,
            };
        };

        warn!(
            position_id = %position_id,
            filled_venue = %filled.venue,
            unfilled_venue = %unfilled.venue,
            "partial fill, unwinding"
        );

        self.adapter_for(unfilled.venue)
            .cancel_order(&unfilled.order_id, &unfilled.token_id)
            .await;

        let unwind_size = if filled.filled_size > Decimal::ZERO {
            filled.filled_size
        } else {
            filled.size
        };
        let request = OrderRequest {
            market_id: position.market_id.clone(),
            token_id: filled.token_id.clone(),
            side: filled.side.opposite(),
            price: filled.price,
            size: unwind_size,
        };
        let placed = self.adapter_for(filled.venue).place_order(&request).await;
        if !placed.success {
            warn!(
                position_id = %position_id,
                error = placed.error.as_deref().unwrap_or_default(),
                "unwind placement failed, staying paused"
            );
            return ExecutionOutcome::Completed {
                position_id,
                status: PositionStatus::Partial,
                pnl: None,
            };
        }
        let unwind_order_id = placed.order_id.clone().unwrap_or_default();

        let mut unwound = placed.filled_at_submission();
        let mut unwound_size = unwind_size;
        if !unwound {
            let interval = Duration::from_millis(config.unwind_poll_interval_ms);
            let adapter = self.adapter_for(filled.venue);
            let mut shutdown = self.shutdown.clone();

            for _ in 0..MAX_UNWIND_POLLS {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    _ = shutdown.changed() => break,
                }
                let report = adapter.get_order_status(&unwind_order_id).await;
                match report.status {
                    OrderStatus::Unknown => {}
                    _ if report.is_filled_for(unwind_size) => {
                        unwound = true;
                        if report.filled_size > Decimal::ZERO {
                            unwound_size = report.filled_size;
                        }
                        break;
                    }
                    OrderStatus::Cancelled | OrderStatus::Expired => break,
                    OrderStatus::Open | OrderStatus::Partial | OrderStatus::Filled => {}
                }
            }
        }

        if unwound {
            let pnl = filled.price * unwound_size - filled.fill_cost();
            info!(
                position_id = %position_id,
                unwind_order_id = %unwind_order_id,
                pnl = %pnl,
                "unwind filled, position closed"
            );
            self.store
                .set_status(position_id, PositionStatus::Closed, Some(pnl), Some("unwound"))
                .await;
            self.pause.clear();
            ExecutionOutcome::Completed {
                position_id,
                status: PositionStatus::Closed,
                pnl: Some(pnl),
            }
        } else {
            warn!(
                position_id = %position_id,
                unwind_order_id = %unwind_order_id,
                "unwind did not fill, operator intervention required"
            );
            ExecutionOutcome::Completed {
                position_id,
                status: PositionStatus::Partial,
                pnl: None,
            }
        }
    }

    /// Re-enters the fill poller for a position reloaded after restart.
    ///
    /// Drives the same poll/classify/unwind path as a fresh execution.
    pub async fn resume(&self, position_id: Uuid, config: &AgentConfig) -> ExecutionOutcome {
        let Some(position) = self.store.get(position_id) else {
            return ExecutionOutcome::Failed {
                reason: "unknown position".to_string(),
            };
        };
        let key = fingerprint(&self.user_id, &position.market_id);
        if !self.in_flight.lock().insert(key.clone()) {
            return ExecutionOutcome::Refused {
                reason: "execution already in flight for market".to_string(),
            };
        }
        let (state_a, state_b) = self.poll_fills(position_id, config).await;
        let outcome = self.classify(position_id, state_a, state_b, config).await;
        self.in_flight.lock().remove(&key);
        outcome
    }

    /// Cancels both legs of every still-open position. Used on agent
    /// stop so placed orders are not abandoned.
    pub async fn cancel_open(&self) {
        for position in self.store.open_positions() {
            if position.status != PositionStatus::Open {
                continue;
            }
            debug!(position_id = %position.id, "cancelling open legs on stop");
            let adapter_a = self.adapter_for(position.leg_a.venue);
            let adapter_b = self.adapter_for(position.leg_b.venue);
            tokio::join!(
                adapter_a.cancel_order(&position.leg_a.order_id, &position.leg_a.token_id),
                adapter_b.cancel_order(&position.leg_b.order_id, &position.leg_b.token_id)
            );
        }
    }
}
