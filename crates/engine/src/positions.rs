//! Position store: in-memory state plus a durable audit trail.
//!
//! Reads hand out cheap snapshots; mutations are serialized per agent
//! and written through to the trade repository. Every status change is
//! appended to an in-process transition log for audit. Repository
//! failures are logged and do not stop the agent.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use arbot_core::repository::{TradePatch, TradeRecord, TradeRepository};
use arbot_core::{Position, PositionStatus};

/// One audit-log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Position the transition belongs to.
    pub position_id: Uuid,
    /// Status before the transition; `None` for creation.
    pub from: Option<PositionStatus>,
    /// Status after the transition.
    pub to: PositionStatus,
    /// When the transition happened.
    pub at: DateTime<Utc>,
    /// Optional context (reject reason, unwind order id).
    pub note: Option<String>,
}

/// Per-agent position store.
pub struct PositionStore {
    user_id: String,
    repo: Arc<dyn TradeRepository>,
    positions: RwLock<HashMap<Uuid, Position>>,
    log: Mutex<Vec<TransitionRecord>>,
    write_guard: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for PositionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionStore")
            .field("user_id", &self.user_id)
            .field("positions", &self.positions.read().len())
            .finish_non_exhaustive()
    }
}

impl PositionStore {
    /// Creates a store for one agent.
    #[must_use]
    pub fn new(user_id: impl Into<String>, repo: Arc<dyn TradeRepository>) -> Self {
        Self {
            user_id: user_id.into(),
            repo,
            positions: RwLock::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            write_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the owning user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Inserts a freshly opened position.
    pub async fn insert(&self, position: Position) {
        let _serialized = self.write_guard.lock().await;
        self.append_log(position.id, None, position.status, None);

        match TradeRecord::from_position(&position) {
            Ok(record) => {
                if let Err(e) = self.repo.insert_trade(&record).await {
                    warn!(position_id = %position.id, error = %e, "trade insert failed");
                }
            }
            Err(e) => warn!(position_id = %position.id, error = %e, "leg serialization failed"),
        }
        self.positions.write().insert(position.id, position);
    }

    /// Transitions a position to a new status, optionally recording PnL.
    pub async fn set_status(
        &self,
        id: Uuid,
        status: PositionStatus,
        pnl: Option<Decimal>,
        note: Option<&str>,
    ) {
        let _serialized = self.write_guard.lock().await;
        let previous = {
            let mut positions = self.positions.write();
            let Some(position) = positions.get_mut(&id) else {
                warn!(position_id = %id, "status change for unknown position");
                return;
            };
            let previous = position.status;
            position.status = status;
            if status.is_terminal() {
                position.closed_at = Some(Utc::now());
            }
            if let Some(pnl) = pnl {
                position.pnl = Some(pnl);
            }
            previous
        };
        self.append_log(id, Some(previous), status, note.map(ToString::to_string));

        let closed_at = self.positions.read().get(&id).and_then(|p| p.closed_at);
        let patch = TradePatch {
            status: Some(status),
            closed_at,
            pnl,
            ..Default::default()
        };
        if let Err(e) = self.repo.update_trade(id, &patch).await {
            warn!(position_id = %id, error = %e, "trade update failed");
        }
        debug!(position_id = %id, status = %status, "position transitioned");
    }

    /// Applies a leg mutation and writes the legs through to the repo.
    pub async fn update_legs<F>(&self, id: Uuid, mutate: F)
    where
        F: FnOnce(&mut Position),
    {
        let _serialized = self.write_guard.lock().await;
        let legs = {
            let mut positions = self.positions.write();
            let Some(position) = positions.get_mut(&id) else {
                warn!(position_id = %id, "leg update for unknown position");
                return;
            };
            mutate(position);
            (
                serde_json::to_value(&position.leg_a),
                serde_json::to_value(&position.leg_b),
            )
        };

        if let (Ok(leg_a), Ok(leg_b)) = legs {
            let patch = TradePatch {
                leg_a: Some(leg_a),
                leg_b: Some(leg_b),
                ..Default::default()
            };
            if let Err(e) = self.repo.update_trade(id, &patch).await {
                warn!(position_id = %id, error = %e, "leg write-through failed");
            }
        }
    }

    /// Returns a snapshot of one position.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Position> {
        self.positions.read().get(&id).cloned()
    }

    /// Returns all positions with non-terminal status.
    #[must_use]
    pub fn open_positions(&self) -> Vec<Position> {
        let mut open: Vec<Position> = self
            .positions
            .read()
            .values()
            .filter(|p| !p.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by_key(|p| p.opened_at);
        open
    }

    /// Returns all positions.
    #[must_use]
    pub fn all_positions(&self) -> Vec<Position> {
        let mut all: Vec<Position> = self.positions.read().values().cloned().collect();
        all.sort_by_key(|p| p.opened_at);
        all
    }

    /// Returns the audit log so far.
    #[must_use]
    pub fn transitions(&self) -> Vec<TransitionRecord> {
        self.log.lock().clone()
    }

    /// Reloads non-terminal positions from the repository after restart.
    ///
    /// Returns how many positions were re-entered; the caller feeds the
    /// OPEN ones back into the fill poller.
    pub async fn reload(&self) -> usize {
        let records = match self.repo.list_open_positions(&self.user_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "position reload failed");
                return 0;
            }
        };

        let mut restored = 0;
        for record in records {
            match record.into_position() {
                Ok(position) => {
                    self.positions.write().insert(position.id, position);
                    restored += 1;
                }
                Err(e) => warn!(error = %e, "unparseable persisted position"),
            }
        }
        debug!(restored, "positions reloaded");
        restored
    }

    fn append_log(
        &self,
        position_id: Uuid,
        from: Option<PositionStatus>,
        to: PositionStatus,
        note: Option<String>,
    ) {
        self.log.lock().push(TransitionRecord {
            position_id,
            from,
            to,
            at: Utc::now(),
            note,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbot_core::{MemoryTradeRepository, PositionLeg, Side, Venue};
    use rust_decimal_macros::dec;

    fn sample_position(user: &str) -> Position {
        let leg_a = PositionLeg::new(Venue::Amm, "a1", "yes", Side::Buy, dec!(0.45), dec!(10));
        let leg_b = PositionLeg::new(Venue::Clob, "b1", "no", Side::Buy, dec!(0.48), dec!(10));
        Position::open(user, "0xabc", leg_a, leg_b, dec!(9.3), dec!(10), dec!(620))
    }

    fn store() -> (Arc<MemoryTradeRepository>, PositionStore) {
        let repo = Arc::new(MemoryTradeRepository::new());
        let store = PositionStore::new("user-1", repo.clone());
        (repo, store)
    }

    #[tokio::test]
    async fn test_insert_writes_through() {
        let (repo, store) = store();
        let position = sample_position("user-1");
        let id = position.id;

        store.insert(position).await;

        assert!(store.get(id).is_some());
        assert!(repo.get(id).is_some());
        assert_eq!(store.transitions().len(), 1);
        assert_eq!(store.transitions()[0].to, PositionStatus::Open);
        assert!(store.transitions()[0].from.is_none());
    }

    #[tokio::test]
    async fn test_set_status_logs_transition() {
        let (repo, store) = store();
        let position = sample_position("user-1");
        let id = position.id;
        store.insert(position).await;

        store
            .set_status(id, PositionStatus::Filled, None, Some("both legs filled"))
            .await;

        let stored = store.get(id).unwrap();
        assert_eq!(stored.status, PositionStatus::Filled);
        assert!(stored.closed_at.is_some());
        assert_eq!(repo.get(id).unwrap().status, PositionStatus::Filled);

        let log = store.transitions();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].from, Some(PositionStatus::Open));
        assert_eq!(log[1].to, PositionStatus::Filled);
        assert_eq!(log[1].note.as_deref(), Some("both legs filled"));
    }

    #[tokio::test]
    async fn test_set_status_records_pnl() {
        let (repo, store) = store();
        let position = sample_position("user-1");
        let id = position.id;
        store.insert(position).await;

        store
            .set_status(id, PositionStatus::Closed, Some(dec!(-0.3)), None)
            .await;

        assert_eq!(store.get(id).unwrap().pnl, Some(dec!(-0.3)));
        assert_eq!(repo.get(id).unwrap().pnl, Some(dec!(-0.3)));
    }

    #[tokio::test]
    async fn test_update_legs_persists() {
        let (repo, store) = store();
        let position = sample_position("user-1");
        let id = position.id;
        store.insert(position).await;

        store
            .update_legs(id, |p| p.leg_a.mark_filled(dec!(10)))
            .await;

        assert!(store.get(id).unwrap().leg_a.filled);
        let record = repo.get(id).unwrap();
        let leg_a: PositionLeg = serde_json::from_value(record.leg_a).unwrap();
        assert!(leg_a.filled);
    }

    #[tokio::test]
    async fn test_open_positions_excludes_terminal() {
        let (_repo, store) = store();
        let open = sample_position("user-1");
        let done = sample_position("user-1");
        let done_id = done.id;
        store.insert(open).await;
        store.insert(done).await;
        store
            .set_status(done_id, PositionStatus::Expired, None, None)
            .await;

        let open_positions = store.open_positions();
        assert_eq!(open_positions.len(), 1);
        assert_ne!(open_positions[0].id, done_id);
    }

    #[tokio::test]
    async fn test_reload_restores_open_positions() {
        let repo = Arc::new(MemoryTradeRepository::new());
        {
            let store = PositionStore::new("user-1", repo.clone());
            store.insert(sample_position("user-1")).await;
            store.insert(sample_position("user-1")).await;
        }

        // Fresh store over the same repository, as after a restart.
        let store = PositionStore::new("user-1", repo);
        assert!(store.open_positions().is_empty());
        assert_eq!(store.reload().await, 2);
        assert_eq!(store.open_positions().len(), 2);
    }

    #[tokio::test]
    async fn test_reload_skips_other_users() {
        let repo = Arc::new(MemoryTradeRepository::new());
        {
            let store = PositionStore::new("user-2", repo.clone());
            store.insert(sample_position("user-2")).await;
        }

        let store = PositionStore::new("user-1", repo);
        assert_eq!(store.reload().await, 0);
    }
}
