//! Trade persistence interface.
//!
//! The relational store is an external collaborator; the core only
//! consumes this interface. Legs are persisted as opaque JSON blobs so
//! the storage layout stays fixed while leg shapes evolve.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::types::{Position, PositionLeg, PositionStatus};

// =============================================================================
// Records
// =============================================================================

/// A persisted trade row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Position identifier.
    pub id: Uuid,
    /// Owning user.
    pub user_id: String,
    /// Market identifier.
    pub market_id: String,
    /// Leg on venue A, as an opaque JSON blob.
    pub leg_a: serde_json::Value,
    /// Leg on venue B, as an opaque JSON blob.
    pub leg_b: serde_json::Value,
    /// Lifecycle status.
    pub status: PositionStatus,
    /// Combined submission cost.
    pub total_cost: Decimal,
    /// Expected payout at resolution.
    pub expected_payout: Decimal,
    /// Net spread in basis points.
    pub spread_bps: Decimal,
    /// When the position was opened.
    pub opened_at: DateTime<Utc>,
    /// When the position closed, if it has.
    pub closed_at: Option<DateTime<Utc>>,
    /// Realized PnL; null until CLOSED.
    pub pnl: Option<Decimal>,
}

impl TradeRecord {
    /// Builds a record from a position.
    ///
    /// # Errors
    /// Returns an error if a leg cannot be serialized.
    pub fn from_position(position: &Position) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: position.id,
            user_id: position.user_id.clone(),
            market_id: position.market_id.clone(),
            leg_a: serde_json::to_value(&position.leg_a)?,
            leg_b: serde_json::to_value(&position.leg_b)?,
            status: position.status,
            total_cost: position.total_cost,
            expected_payout: position.expected_payout,
            spread_bps: position.spread_bps,
            opened_at: position.opened_at,
            closed_at: position.closed_at,
            pnl: position.pnl,
        })
    }

    /// Reconstructs a position from this record.
    ///
    /// # Errors
    /// Returns an error if a leg blob does not parse.
    pub fn into_position(self) -> Result<Position, serde_json::Error> {
        let leg_a: PositionLeg = serde_json::from_value(self.leg_a)?;
        let leg_b: PositionLeg = serde_json::from_value(self.leg_b)?;
        Ok(Position {
            id: self.id,
            user_id: self.user_id,
            market_id: self.market_id,
            leg_a,
            leg_b,
            status: self.status,
            total_cost: self.total_cost,
            expected_payout: self.expected_payout,
            spread_bps: self.spread_bps,
            opened_at: self.opened_at,
            closed_at: self.closed_at,
            pnl: self.pnl,
        })
    }
}

/// A partial update to a persisted trade.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradePatch {
    /// New status, if changed.
    pub status: Option<PositionStatus>,
    /// Updated leg A blob, if changed.
    pub leg_a: Option<serde_json::Value>,
    /// Updated leg B blob, if changed.
    pub leg_b: Option<serde_json::Value>,
    /// Close timestamp, if closing.
    pub closed_at: Option<DateTime<Utc>>,
    /// Realized PnL, if known.
    pub pnl: Option<Decimal>,
}

// =============================================================================
// Repository Trait
// =============================================================================

/// Persistence operations consumed by the position store.
#[async_trait]
pub trait TradeRepository: Send + Sync {
    /// Inserts a new trade row.
    async fn insert_trade(&self, record: &TradeRecord) -> anyhow::Result<()>;

    /// Applies a partial update to an existing trade.
    async fn update_trade(&self, id: Uuid, patch: &TradePatch) -> anyhow::Result<()>;

    /// Lists positions with non-terminal status for a user.
    async fn list_open_positions(&self, user_id: &str) -> anyhow::Result<Vec<TradeRecord>>;
}

// =============================================================================
// In-Memory Repository
// =============================================================================

/// In-memory repository used by tests and dry-run agents.
#[derive(Debug, Default)]
pub struct MemoryTradeRepository {
    trades: Mutex<HashMap<Uuid, TradeRecord>>,
}

impl MemoryTradeRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored trades.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trades.lock().len()
    }

    /// Returns true when no trades are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trades.lock().is_empty()
    }

    /// Returns a stored trade by id.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<TradeRecord> {
        self.trades.lock().get(&id).cloned()
    }
}

#[async_trait]
impl TradeRepository for MemoryTradeRepository {
    async fn insert_trade(&self, record: &TradeRecord) -> anyhow::Result<()> {
        self.trades.lock().insert(record.id, record.clone());
        Ok(())
    }

    async fn update_trade(&self, id: Uuid, patch: &TradePatch) -> anyhow::Result<()> {
        let mut trades = self.trades.lock();
        let record = trades
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("trade not found: {id}"))?;

        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(ref leg_a) = patch.leg_a {
            record.leg_a = leg_a.clone();
        }
        if let Some(ref leg_b) = patch.leg_b {
            record.leg_b = leg_b.clone();
        }
        if let Some(closed_at) = patch.closed_at {
            record.closed_at = Some(closed_at);
        }
        if let Some(pnl) = patch.pnl {
            record.pnl = Some(pnl);
        }
        Ok(())
    }

    async fn list_open_positions(&self, user_id: &str) -> anyhow::Result<Vec<TradeRecord>> {
        let mut open: Vec<TradeRecord> = self
            .trades
            .lock()
            .values()
            .filter(|r| r.user_id == user_id && !r.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by_key(|r| r.opened_at);
        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Side, Venue};
    use rust_decimal_macros::dec;

    fn sample_position(user: &str) -> Position {
        let leg_a = PositionLeg::new(Venue::Amm, "a1", "yes", Side::Buy, dec!(0.45), dec!(10));
        let leg_b = PositionLeg::new(Venue::Clob, "b1", "no", Side::Buy, dec!(0.48), dec!(10));
        Position::open(user, "0xabc", leg_a, leg_b, dec!(9.3), dec!(10), dec!(620))
    }

    #[test]
    fn test_record_round_trip() {
        let position = sample_position("user-1");
        let record = TradeRecord::from_position(&position).unwrap();
        let back = record.into_position().unwrap();

        assert_eq!(back.id, position.id);
        assert_eq!(back.leg_a.order_id, "a1");
        assert_eq!(back.leg_b.price, dec!(0.48));
    }

    #[tokio::test]
    async fn test_memory_repo_insert_and_list() {
        let repo = MemoryTradeRepository::new();
        let position = sample_position("user-1");
        let record = TradeRecord::from_position(&position).unwrap();

        repo.insert_trade(&record).await.unwrap();
        assert_eq!(repo.len(), 1);

        let open = repo.list_open_positions("user-1").await.unwrap();
        assert_eq!(open.len(), 1);

        let other = repo.list_open_positions("user-2").await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_memory_repo_update_closes_trade() {
        let repo = MemoryTradeRepository::new();
        let position = sample_position("user-1");
        let record = TradeRecord::from_position(&position).unwrap();
        repo.insert_trade(&record).await.unwrap();

        let patch = TradePatch {
            status: Some(PositionStatus::Closed),
            closed_at: Some(Utc::now()),
            pnl: Some(dec!(-0.2)),
            ..Default::default()
        };
        repo.update_trade(record.id, &patch).await.unwrap();

        let stored = repo.get(record.id).unwrap();
        assert_eq!(stored.status, PositionStatus::Closed);
        assert_eq!(stored.pnl, Some(dec!(-0.2)));

        // Closed trades no longer appear as open.
        let open = repo.list_open_positions("user-1").await.unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn test_memory_repo_update_missing_trade_errors() {
        let repo = MemoryTradeRepository::new();
        let patch = TradePatch::default();
        assert!(repo.update_trade(Uuid::new_v4(), &patch).await.is_err());
    }
}
