//! Quote source: fused market snapshots across venues.
//!
//! Each cycle polls every feed for the tracked markets and fails open: a
//! venue that errors contributes zero quotes and the cycle proceeds with
//! whatever was obtained. Snapshot ids increase monotonically. The only
//! caching is the last successful snapshot, kept for read-only status
//! surfaces.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use arbot_core::adapter::QuoteFeed;
use arbot_core::QuoteSnapshot;

use crate::catalog::MarketCatalog;

/// Polls venue feeds and assembles [`QuoteSnapshot`]s.
pub struct QuoteSource {
    feeds: Vec<Arc<dyn QuoteFeed>>,
    catalog: Arc<MarketCatalog>,
    next_id: AtomicU64,
    last_snapshot: RwLock<Option<QuoteSnapshot>>,
}

impl std::fmt::Debug for QuoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteSource")
            .field("feeds", &self.feeds.len())
            .field("tracked_markets", &self.catalog.len())
            .finish()
    }
}

impl QuoteSource {
    /// Creates a source over the given feeds.
    #[must_use]
    pub fn new(feeds: Vec<Arc<dyn QuoteFeed>>, catalog: Arc<MarketCatalog>) -> Self {
        Self {
            feeds,
            catalog,
            next_id: AtomicU64::new(1),
            last_snapshot: RwLock::new(None),
        }
    }

    /// Produces a fresh snapshot of the tracked markets.
    ///
    /// Per-venue failures are logged and contribute no quotes.
    pub async fn snapshot(&self) -> QuoteSnapshot {
        let market_ids = self.catalog.tracked_ids();
        let mut quotes = Vec::new();

        for feed in &self.feeds {
            let (venue, result) = (feed.venue(), feed.fetch_quotes(&market_ids).await);
            match result {
                Ok(mut venue_quotes) => {
                    debug!(venue = %venue, quotes = venue_quotes.len(), "venue quotes fetched");
                    quotes.append(&mut venue_quotes);
                }
                Err(e) => {
                    warn!(venue = %venue, error = %e, "venue quote fetch failed, continuing without it");
                }
            }
        }

        let snapshot = QuoteSnapshot {
            snapshot_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            produced_at: Utc::now(),
            quotes,
        };
        *self.last_snapshot.write() = Some(snapshot.clone());
        snapshot
    }

    /// Returns the last successful snapshot, for read-only surfaces.
    #[must_use]
    pub fn last_snapshot(&self) -> Option<QuoteSnapshot> {
        self.last_snapshot.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MarketMeta;
    use crate::testkit::ScriptedFeed;
    use arbot_core::Venue;
    use rust_decimal_macros::dec;

    fn catalog_with(ids: &[&str]) -> Arc<MarketCatalog> {
        let catalog = MarketCatalog::new();
        for id in ids {
            catalog.upsert(MarketMeta::new(*id));
        }
        Arc::new(catalog)
    }

    #[tokio::test]
    async fn test_snapshot_merges_both_venues() {
        let amm = Arc::new(ScriptedFeed::new(Venue::Amm).with_quote(
            "0xabc",
            dec!(0.45),
            dec!(0.55),
            dec!(100),
        ));
        let clob = Arc::new(ScriptedFeed::new(Venue::Clob).with_quote(
            "0xabc",
            dec!(0.50),
            dec!(0.48),
            dec!(80),
        ));
        let source = QuoteSource::new(vec![amm, clob], catalog_with(&["0xabc"]));

        let snapshot = source.snapshot().await;
        assert_eq!(snapshot.snapshot_id, 1);
        assert_eq!(snapshot.quotes.len(), 2);
        assert!(snapshot.quote("0xabc", Venue::Amm).is_some());
        assert!(snapshot.quote("0xabc", Venue::Clob).is_some());
    }

    #[tokio::test]
    async fn test_snapshot_fails_open_on_venue_error() {
        let amm = Arc::new(ScriptedFeed::new(Venue::Amm).with_quote(
            "0xabc",
            dec!(0.45),
            dec!(0.55),
            dec!(100),
        ));
        let clob = Arc::new(ScriptedFeed::new(Venue::Clob).failing());
        let source = QuoteSource::new(vec![amm, clob], catalog_with(&["0xabc"]));

        let snapshot = source.snapshot().await;
        assert_eq!(snapshot.quotes.len(), 1);
        assert_eq!(snapshot.quotes[0].venue, Venue::Amm);
    }

    #[tokio::test]
    async fn test_snapshot_ids_increase() {
        let source = QuoteSource::new(vec![], catalog_with(&[]));
        let first = source.snapshot().await;
        let second = source.snapshot().await;
        assert!(second.snapshot_id > first.snapshot_id);
    }

    #[tokio::test]
    async fn test_last_snapshot_is_cached() {
        let source = QuoteSource::new(vec![], catalog_with(&[]));
        assert!(source.last_snapshot().is_none());

        let snapshot = source.snapshot().await;
        assert_eq!(
            source.last_snapshot().unwrap().snapshot_id,
            snapshot.snapshot_id
        );
    }
}
