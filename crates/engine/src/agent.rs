//! The per-user trading agent.
//!
//! One agent owns one scan→detect→size→execute cycle. Cycles never
//! overlap: the caller (the supervisor's actor loop) awaits
//! [`Agent::run_cycle`] before scheduling the next tick. A paused agent
//! still scans for observability but refuses to execute. Session gates
//! (duration, trade count, loss stop) end the session.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use arbot_core::adapter::{QuoteFeed, VenueAdapter};
use arbot_core::repository::TradeRepository;
use arbot_core::{AgentConfig, PositionStatus};

use crate::catalog::MarketCatalog;
use crate::detector::Detector;
use crate::executor::{ExecutionOutcome, Executor, PauseState};
use crate::fees::FeeCalculator;
use crate::positions::PositionStore;
use crate::quotes::QuoteSource;
use crate::sizing::{self, DailyLossTracker, GateContext, RejectReason};

// =============================================================================
// Status and Cycle Outcome
// =============================================================================

/// Point-in-time view of an agent, published after every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Owning user.
    pub user_id: String,
    /// Whether the scan loop is running.
    pub running: bool,
    /// Whether executions are currently forbidden.
    pub paused: bool,
    /// Pause reason, when paused.
    pub pause_reason: Option<String>,
    /// Trades executed this session.
    pub trades_executed: u32,
    /// Realized PnL this session.
    pub pnl_realized: Decimal,
    /// When the session started.
    pub session_start: DateTime<Utc>,
    /// When the last scan completed.
    pub last_scan: Option<DateTime<Utc>>,
    /// Milliseconds since session start.
    pub uptime_ms: u64,
    /// Active configuration.
    pub config: AgentConfig,
}

/// What one scan cycle did.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// A session gate fired; the agent should stop.
    SessionEnded(RejectReason),
    /// No opportunity cleared the spread floor.
    NoOpportunity,
    /// Every surviving opportunity was rejected by the risk gate.
    AllRejected,
    /// Paused: the scan ran for observability, nothing was executed.
    Skipped,
    /// The best surviving opportunity was handed to the executor.
    Executed(ExecutionOutcome),
}

// =============================================================================
// Agent
// =============================================================================

/// Everything an agent is wired to.
pub struct AgentDeps {
    /// Venue A adapter, bound to this user's signer.
    pub venue_a: Arc<dyn VenueAdapter>,
    /// Venue B adapter.
    pub venue_b: Arc<dyn VenueAdapter>,
    /// Quote feeds, one per venue.
    pub feeds: Vec<Arc<dyn QuoteFeed>>,
    /// Tracked-market catalog.
    pub catalog: Arc<MarketCatalog>,
    /// Trade persistence.
    pub repo: Arc<dyn TradeRepository>,
}

/// A single user's trading agent.
pub struct Agent {
    user_id: String,
    config: RwLock<AgentConfig>,
    quotes: QuoteSource,
    detector: Detector,
    executor: Executor,
    store: Arc<PositionStore>,
    pause: Arc<PauseState>,
    venue_a: Arc<dyn VenueAdapter>,
    venue_b: Arc<dyn VenueAdapter>,
    catalog: Arc<MarketCatalog>,
    loss_tracker: DailyLossTracker,
    session_start: DateTime<Utc>,
    trades_executed: AtomicU32,
    pnl_realized: Mutex<Decimal>,
    last_scan: Mutex<Option<DateTime<Utc>>>,
    rejections: Mutex<HashMap<RejectReason, u32>>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("user_id", &self.user_id)
            .field("paused", &self.pause.is_paused())
            .field("trades_executed", &self.trades_executed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Wires up an agent.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        config: AgentConfig,
        deps: AgentDeps,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let user_id = user_id.into();
        let store = Arc::new(PositionStore::new(user_id.clone(), deps.repo));
        let pause = Arc::new(PauseState::new());
        let quotes = QuoteSource::new(deps.feeds, deps.catalog.clone());
        let detector = Detector::new(FeeCalculator::new());
        let executor = Executor::new(
            user_id.clone(),
            deps.venue_a.clone(),
            deps.venue_b.clone(),
            deps.catalog.clone(),
            store.clone(),
            pause.clone(),
            shutdown,
        );

        Self {
            user_id,
            config: RwLock::new(config),
            quotes,
            detector,
            executor,
            store,
            pause,
            venue_a: deps.venue_a,
            venue_b: deps.venue_b,
            catalog: deps.catalog,
            loss_tracker: DailyLossTracker::new(),
            session_start: Utc::now(),
            trades_executed: AtomicU32::new(0),
            pnl_realized: Mutex::new(Decimal::ZERO),
            last_scan: Mutex::new(None),
            rejections: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the owning user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the position store.
    #[must_use]
    pub fn store(&self) -> &Arc<PositionStore> {
        &self.store
    }

    /// One-time startup work: approvals, authentication, and reloading
    /// open positions back into the fill poller.
    pub async fn init(&self) {
        self.venue_a.ensure_approvals().await;
        self.venue_b.ensure_approvals().await;
        if let Err(e) = self.venue_a.authenticate().await {
            warn!(user_id = %self.user_id, error = %e, "venue A authentication failed");
        }
        if let Err(e) = self.venue_b.authenticate().await {
            warn!(user_id = %self.user_id, error = %e, "venue B authentication failed");
        }

        let restored = self.store.reload().await;
        if restored > 0 {
            info!(user_id = %self.user_id, restored, "re-entering reloaded positions");
            let config = self.config.read().clone();
            for position in self.store.open_positions() {
                if position.status == PositionStatus::Open {
                    let outcome = self.executor.resume(position.id, &config).await;
                    self.account(&outcome);
                }
            }
        }
    }

    /// Replaces the configuration. Called between scans, never
    /// mid-execution.
    pub fn update_config(&self, config: AgentConfig) {
        info!(user_id = %self.user_id, "configuration updated");
        *self.config.write() = config;
    }

    /// Operator action: clears a pause left by a failed unwind.
    pub fn operator_resume(&self) {
        self.pause.clear();
    }

    /// Checks the session gates without scanning.
    #[must_use]
    pub fn session_gate_breach(&self) -> Option<RejectReason> {
        let config = self.config.read();

        if let Some(max_trades) = config.max_total_trades {
            if self.trades_executed.load(Ordering::SeqCst) >= max_trades {
                return Some(RejectReason::MaxTradesReached);
            }
        }
        if let Some(duration_ms) = config.trading_duration_ms {
            let elapsed = (Utc::now() - self.session_start).num_milliseconds();
            if elapsed >= 0 && elapsed as u64 >= duration_ms {
                return Some(RejectReason::SessionExpired);
            }
        }
        if let Some(limit) = config.daily_loss_limit {
            if self.loss_tracker.loss_today() >= limit {
                return Some(RejectReason::DailyLossLimit);
            }
        }
        None
    }

    /// Runs one scan cycle to completion.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if let Some(reason) = self.session_gate_breach() {
            info!(user_id = %self.user_id, reason = %reason, "session gate fired");
            return CycleOutcome::SessionEnded(reason);
        }

        let config = self.config.read().clone();
        let snapshot = self.quotes.snapshot().await;
        let opportunities = self.detector.detect(
            &snapshot,
            &self.catalog,
            config.min_spread_bps,
            config.gas_to_quote_rate,
        );
        *self.last_scan.lock() = Some(Utc::now());

        if opportunities.is_empty() {
            return CycleOutcome::NoOpportunity;
        }
        if self.pause.is_paused() {
            debug!(user_id = %self.user_id, "paused, scan observed only");
            return CycleOutcome::Skipped;
        }

        let (balance_a, balance_b) =
            tokio::join!(self.venue_a.get_balance(), self.venue_b.get_balance());
        let balance_a = balance_a.unwrap_or_else(|e| {
            warn!(user_id = %self.user_id, error = %e, "venue A balance fetch failed");
            Decimal::ZERO
        });
        let balance_b = balance_b.unwrap_or_else(|e| {
            warn!(user_id = %self.user_id, error = %e, "venue B balance fetch failed");
            Decimal::ZERO
        });
        // Capital spans both venues; the per-venue balance gate still
        // rejects a leg its own venue cannot fund.
        let capital = balance_a + balance_b;

        let context = GateContext {
            session_start: self.session_start,
            trades_executed: self.trades_executed.load(Ordering::SeqCst),
            loss_today: self.loss_tracker.loss_today(),
            balance_a,
            balance_b,
        };

        for opportunity in &opportunities {
            let size = sizing::position_size(opportunity, &config, capital);
            if let Err(reason) = sizing::check(opportunity, size, &config, &context) {
                debug!(
                    user_id = %self.user_id,
                    market_id = %opportunity.market_id,
                    reason = %reason,
                    "opportunity rejected"
                );
                *self.rejections.lock().entry(reason).or_insert(0) += 1;
                continue;
            }

            let outcome = self.executor.execute(opportunity, size, &config).await;
            self.account(&outcome);
            return CycleOutcome::Executed(outcome);
        }

        CycleOutcome::AllRejected
    }

    /// Stop-path cleanup: cancel the legs of any open position.
    pub async fn shutdown_cleanup(&self) {
        self.executor.cancel_open().await;
    }

    /// Returns per-reason rejection counts for this session.
    #[must_use]
    pub fn rejection_counts(&self) -> HashMap<RejectReason, u32> {
        self.rejections.lock().clone()
    }

    /// Builds a status snapshot.
    #[must_use]
    pub fn status(&self, running: bool) -> AgentStatus {
        let uptime = (Utc::now() - self.session_start).num_milliseconds().max(0) as u64;
        AgentStatus {
            user_id: self.user_id.clone(),
            running,
            paused: self.pause.is_paused(),
            pause_reason: self.pause.reason(),
            trades_executed: self.trades_executed.load(Ordering::SeqCst),
            pnl_realized: *self.pnl_realized.lock(),
            session_start: self.session_start,
            last_scan: *self.last_scan.lock(),
            uptime_ms: uptime,
            config: self.config.read().clone(),
        }
    }

    fn account(&self, outcome: &ExecutionOutcome) {
        if outcome.is_filled() {
            self.trades_executed.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(pnl) = outcome.pnl() {
            *self.pnl_realized.lock() += pnl;
            self.loss_tracker.record(pnl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MarketMeta, MarketTokens};
    use crate::testkit::{ScriptedAdapter, ScriptedFeed};
    use arbot_core::adapter::PlaceOrderResult;
    use arbot_core::{MemoryTradeRepository, OrderStatus, Venue};
    use rust_decimal_macros::dec;

    fn catalog() -> Arc<MarketCatalog> {
        let catalog = MarketCatalog::new();
        catalog.upsert(
            MarketMeta::new("0xabc")
                .with_venue(Venue::Amm, MarketTokens::new("amm-yes", "amm-no"))
                .with_venue(Venue::Clob, MarketTokens::new("clob-yes", "clob-no")),
        );
        Arc::new(catalog)
    }

    fn arb_feeds() -> Vec<Arc<dyn QuoteFeed>> {
        // YES(A) 0.45 + NO(B) 0.48 = 0.93: a 700 bps gross spread.
        vec![
            Arc::new(ScriptedFeed::new(Venue::Amm).with_quote(
                "0xabc",
                dec!(0.45),
                dec!(0.60),
                dec!(100),
            )),
            Arc::new(ScriptedFeed::new(Venue::Clob).with_quote(
                "0xabc",
                dec!(0.60),
                dec!(0.48),
                dec!(100),
            )),
        ]
    }

    fn agent_with(
        venue_a: ScriptedAdapter,
        venue_b: ScriptedAdapter,
        config: AgentConfig,
    ) -> (Agent, Arc<ScriptedAdapter>, Arc<ScriptedAdapter>) {
        let venue_a = Arc::new(venue_a);
        let venue_b = Arc::new(venue_b);
        let (_tx, rx) = watch::channel(false);
        let agent = Agent::new(
            "user-1",
            config,
            AgentDeps {
                venue_a: venue_a.clone(),
                venue_b: venue_b.clone(),
                feeds: arb_feeds(),
                catalog: catalog(),
                repo: Arc::new(MemoryTradeRepository::new()),
            },
            rx,
        );
        (agent, venue_a, venue_b)
    }

    fn filled(order_id: &str) -> PlaceOrderResult {
        PlaceOrderResult::accepted(order_id, Some(OrderStatus::Filled))
    }

    // ==================== Cycle Tests ====================

    #[tokio::test]
    async fn test_cycle_executes_best_opportunity() {
        let (agent, venue_a, venue_b) = agent_with(
            ScriptedAdapter::new(Venue::Amm).with_place_result(filled("a1")),
            ScriptedAdapter::new(Venue::Clob).with_place_result(filled("b1")),
            AgentConfig::default(),
        );

        let outcome = agent.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Executed(ExecutionOutcome::Completed {
                status: PositionStatus::Filled,
                ..
            })
        ));

        assert_eq!(venue_a.placements(), 1);
        assert_eq!(venue_b.placements(), 1);

        let status = agent.status(true);
        assert_eq!(status.trades_executed, 1);
        assert!(status.last_scan.is_some());
        assert!(!status.paused);
    }

    #[tokio::test]
    async fn test_cycle_no_opportunity() {
        let venue_a = Arc::new(ScriptedAdapter::new(Venue::Amm));
        let venue_b = Arc::new(ScriptedAdapter::new(Venue::Clob));
        let (_tx, rx) = watch::channel(false);
        // Combined cost above payout on both directions.
        let feeds: Vec<Arc<dyn QuoteFeed>> = vec![
            Arc::new(ScriptedFeed::new(Venue::Amm).with_quote(
                "0xabc",
                dec!(0.55),
                dec!(0.55),
                dec!(100),
            )),
            Arc::new(ScriptedFeed::new(Venue::Clob).with_quote(
                "0xabc",
                dec!(0.55),
                dec!(0.55),
                dec!(100),
            )),
        ];
        let agent = Agent::new(
            "user-1",
            AgentConfig::default(),
            AgentDeps {
                venue_a: venue_a.clone(),
                venue_b,
                feeds,
                catalog: catalog(),
                repo: Arc::new(MemoryTradeRepository::new()),
            },
            rx,
        );

        assert!(matches!(agent.run_cycle().await, CycleOutcome::NoOpportunity));
        assert_eq!(venue_a.placements(), 0);
    }

    #[tokio::test]
    async fn test_cycle_balance_gate_blocks_placement() {
        let (agent, venue_a, _venue_b) = agent_with(
            ScriptedAdapter::new(Venue::Amm).with_balance(dec!(0.5)),
            ScriptedAdapter::new(Venue::Clob).with_balance(dec!(1_000)),
            AgentConfig::default(),
        );

        let outcome = agent.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::AllRejected));
        // The gate fired before any placeOrder call.
        assert_eq!(venue_a.placements(), 0);
        assert_eq!(
            agent.rejection_counts().get(&RejectReason::InsufficientBalance),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn test_cycle_session_trade_cap_ends_session() {
        let (agent, venue_a, _venue_b) = agent_with(
            ScriptedAdapter::new(Venue::Amm),
            ScriptedAdapter::new(Venue::Clob),
            AgentConfig::default().with_max_total_trades(0),
        );

        let outcome = agent.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::SessionEnded(RejectReason::MaxTradesReached)
        ));
        // Session gates fire before the scan does any work.
        assert_eq!(venue_a.placements(), 0);
    }

    #[tokio::test]
    async fn test_cycle_session_duration_ends_session() {
        let (agent, _a, _b) = agent_with(
            ScriptedAdapter::new(Venue::Amm),
            ScriptedAdapter::new(Venue::Clob),
            AgentConfig::default().with_trading_duration_ms(0),
        );

        assert!(matches!(
            agent.run_cycle().await,
            CycleOutcome::SessionEnded(RejectReason::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_paused_agent_scans_but_refuses() {
        let (agent, venue_a, _venue_b) = agent_with(
            ScriptedAdapter::new(Venue::Amm).with_place_result(filled("a1")),
            ScriptedAdapter::new(Venue::Clob).with_place_result(filled("b1")),
            AgentConfig::default(),
        );
        agent.pause.pause("partial_fill:awaiting_unwind");

        let outcome = agent.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Skipped));
        assert_eq!(venue_a.placements(), 0);
        // The scan itself still ran.
        assert!(agent.status(true).last_scan.is_some());

        agent.operator_resume();
        let outcome = agent.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Executed(_)));
    }

    #[tokio::test]
    async fn test_daily_loss_gate_ends_session() {
        let (agent, _a, _b) = agent_with(
            ScriptedAdapter::new(Venue::Amm),
            ScriptedAdapter::new(Venue::Clob),
            AgentConfig::default().with_daily_loss_limit(dec!(10)),
        );
        agent.loss_tracker.record(dec!(-15));

        assert!(matches!(
            agent.run_cycle().await,
            CycleOutcome::SessionEnded(RejectReason::DailyLossLimit)
        ));
    }

    // ==================== Accounting Tests ====================

    #[tokio::test]
    async fn test_pnl_accounting_from_unwind() {
        let (agent, _a, _b) = agent_with(
            ScriptedAdapter::new(Venue::Amm),
            ScriptedAdapter::new(Venue::Clob),
            AgentConfig::default(),
        );

        agent.account(&ExecutionOutcome::Completed {
            position_id: uuid::Uuid::new_v4(),
            status: PositionStatus::Closed,
            pnl: Some(dec!(-2.5)),
        });

        let status = agent.status(true);
        assert_eq!(status.pnl_realized, dec!(-2.5));
        // The unwound trade never counted as executed.
        assert_eq!(status.trades_executed, 0);
        assert_eq!(agent.loss_tracker.loss_today(), dec!(2.5));
    }

    // ==================== Init / Reload Tests ====================

    #[tokio::test]
    async fn test_init_resumes_reloaded_open_position() {
        use arbot_core::{Position, PositionLeg, Side};
        use arbot_core::repository::TradeRecord;

        let repo = Arc::new(MemoryTradeRepository::new());
        // A position left OPEN by a previous process.
        let leg_a = PositionLeg::new(Venue::Amm, "a1", "amm-yes", Side::Buy, dec!(0.45), dec!(10));
        let leg_b = PositionLeg::new(Venue::Clob, "b1", "clob-no", Side::Buy, dec!(0.48), dec!(10));
        let position =
            Position::open("user-1", "0xabc", leg_a, leg_b, dec!(9.3), dec!(10), dec!(620));
        let position_id = position.id;
        repo.insert_trade(&TradeRecord::from_position(&position).unwrap())
            .await
            .unwrap();

        let venue_a = Arc::new(ScriptedAdapter::new(Venue::Amm).with_statuses(
            "a1",
            vec![ScriptedAdapter::report("a1", OrderStatus::Filled, dec!(10))],
        ));
        let venue_b = Arc::new(ScriptedAdapter::new(Venue::Clob).with_statuses(
            "b1",
            vec![ScriptedAdapter::report("b1", OrderStatus::Filled, dec!(10))],
        ));
        let (_tx, rx) = watch::channel(false);
        let mut config = AgentConfig::default();
        config.fill_poll_interval_ms = 5;
        config.fill_poll_timeout_ms = 40;

        let agent = Agent::new(
            "user-1",
            config,
            AgentDeps {
                venue_a,
                venue_b,
                feeds: vec![],
                catalog: catalog(),
                repo,
            },
            rx,
        );
        agent.init().await;

        let position = agent.store().get(position_id).unwrap();
        assert_eq!(position.status, PositionStatus::Filled);
        assert_eq!(agent.status(true).trades_executed, 1);
    }
}
