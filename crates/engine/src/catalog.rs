//! Market catalog: per-venue token ids and resolution times.
//!
//! The executor needs each venue's YES/NO token ids before it can build
//! legs, and the detector needs resolution times for annualized ranking.
//! The catalog is the single place both are resolved from; the discovery
//! pipeline that populates it is an external collaborator.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use arbot_core::{Outcome, Venue};

/// The outcome token pair one venue uses for a market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketTokens {
    /// YES outcome token id.
    pub yes_token_id: String,
    /// NO outcome token id.
    pub no_token_id: String,
}

impl MarketTokens {
    /// Creates a token pair.
    #[must_use]
    pub fn new(yes_token_id: impl Into<String>, no_token_id: impl Into<String>) -> Self {
        Self {
            yes_token_id: yes_token_id.into(),
            no_token_id: no_token_id.into(),
        }
    }

    /// Returns the token id for an outcome.
    #[must_use]
    pub fn token_for(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::Yes => &self.yes_token_id,
            Outcome::No => &self.no_token_id,
        }
    }
}

/// One tracked market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMeta {
    /// Market identifier.
    pub market_id: String,
    /// Human-readable title.
    pub title: Option<String>,
    /// When the market resolves, if known.
    pub resolves_at: Option<DateTime<Utc>>,
    /// Token pairs per venue.
    pub venues: HashMap<Venue, MarketTokens>,
}

impl MarketMeta {
    /// Creates a market entry with no venue tokens yet.
    #[must_use]
    pub fn new(market_id: impl Into<String>) -> Self {
        Self {
            market_id: market_id.into(),
            title: None,
            resolves_at: None,
            venues: HashMap::new(),
        }
    }

    /// Adds a venue's token pair.
    #[must_use]
    pub fn with_venue(mut self, venue: Venue, tokens: MarketTokens) -> Self {
        self.venues.insert(venue, tokens);
        self
    }

    /// Sets the resolution time.
    #[must_use]
    pub fn with_resolves_at(mut self, at: DateTime<Utc>) -> Self {
        self.resolves_at = Some(at);
        self
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Thread-shared catalog of tracked markets.
#[derive(Debug, Default)]
pub struct MarketCatalog {
    markets: RwLock<HashMap<String, MarketMeta>>,
}

impl MarketCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a market entry.
    pub fn upsert(&self, meta: MarketMeta) {
        self.markets.write().insert(meta.market_id.clone(), meta);
    }

    /// Returns a market entry.
    #[must_use]
    pub fn get(&self, market_id: &str) -> Option<MarketMeta> {
        self.markets.read().get(market_id).cloned()
    }

    /// Returns the token pair a venue uses for a market.
    #[must_use]
    pub fn tokens_for(&self, market_id: &str, venue: Venue) -> Option<MarketTokens> {
        self.markets
            .read()
            .get(market_id)
            .and_then(|m| m.venues.get(&venue))
            .cloned()
    }

    /// Returns the resolution time of a market, if known.
    #[must_use]
    pub fn resolves_at(&self, market_id: &str) -> Option<DateTime<Utc>> {
        self.markets.read().get(market_id).and_then(|m| m.resolves_at)
    }

    /// Returns all tracked market ids, sorted for determinism.
    #[must_use]
    pub fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.markets.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of tracked markets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.markets.read().len()
    }

    /// Returns true when no markets are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markets.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta() -> MarketMeta {
        MarketMeta::new("0xabc")
            .with_title("Will it rain?")
            .with_venue(Venue::Amm, MarketTokens::new("amm-yes", "amm-no"))
            .with_venue(Venue::Clob, MarketTokens::new("clob-yes", "clob-no"))
    }

    #[test]
    fn test_tokens_for_venue_and_outcome() {
        let catalog = MarketCatalog::new();
        catalog.upsert(sample_meta());

        let tokens = catalog.tokens_for("0xabc", Venue::Amm).unwrap();
        assert_eq!(tokens.token_for(Outcome::Yes), "amm-yes");
        assert_eq!(tokens.token_for(Outcome::No), "amm-no");

        let tokens = catalog.tokens_for("0xabc", Venue::Clob).unwrap();
        assert_eq!(tokens.token_for(Outcome::No), "clob-no");
    }

    #[test]
    fn test_missing_market_or_venue() {
        let catalog = MarketCatalog::new();
        catalog.upsert(MarketMeta::new("0xabc"));

        assert!(catalog.tokens_for("0xdef", Venue::Amm).is_none());
        assert!(catalog.tokens_for("0xabc", Venue::Amm).is_none());
    }

    #[test]
    fn test_tracked_ids_sorted() {
        let catalog = MarketCatalog::new();
        catalog.upsert(MarketMeta::new("0xbbb"));
        catalog.upsert(MarketMeta::new("0xaaa"));

        assert_eq!(catalog.tracked_ids(), vec!["0xaaa", "0xbbb"]);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_upsert_replaces() {
        let catalog = MarketCatalog::new();
        catalog.upsert(sample_meta());
        catalog.upsert(MarketMeta::new("0xabc"));

        assert!(catalog.get("0xabc").unwrap().title.is_none());
        assert_eq!(catalog.len(), 1);
    }
}
