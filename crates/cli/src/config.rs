//! Application configuration for the CLI runner.
//!
//! Loaded with figment: a TOML file overlaid with `ARBOT_`-prefixed
//! environment variables. Private keys themselves stay in per-user
//! environment variables and never appear in the file.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use arbot_core::AgentConfig;

/// One venue endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueEndpoint {
    /// REST base URL.
    pub base_url: String,
    /// Run this venue in dry-run mode.
    #[serde(default)]
    pub dry_run: bool,
}

/// One tracked market with its per-venue token ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEntry {
    /// Market identifier (32-byte hex).
    pub market_id: String,
    /// Optional resolution time.
    pub resolves_at: Option<chrono::DateTime<chrono::Utc>>,
    /// YES token id on the AMM venue.
    pub amm_yes_token: String,
    /// NO token id on the AMM venue.
    pub amm_no_token: String,
    /// YES token id on the CLOB venue.
    pub clob_yes_token: String,
    /// NO token id on the CLOB venue.
    pub clob_no_token: String,
}

/// One user to run an agent for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    /// User identifier.
    pub user_id: String,
    /// Environment variable holding the user's private key.
    pub private_key_env: String,
    /// Agent configuration.
    #[serde(default)]
    pub config: AgentConfig,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// AMM venue endpoint.
    pub amm: VenueEndpoint,
    /// CLOB venue endpoint.
    pub clob: VenueEndpoint,
    /// Chain id for signing.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Maximum number of live agents.
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    /// Tracked markets.
    #[serde(default)]
    pub markets: Vec<MarketEntry>,
    /// Users to run agents for.
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

fn default_chain_id() -> u64 {
    137
}

fn default_max_agents() -> usize {
    16
}

impl AppConfig {
    /// Loads configuration from a TOML file plus `ARBOT_` env overrides.
    ///
    /// # Errors
    /// Returns an error when the file is missing or malformed.
    pub fn load(path: &str) -> Result<Self> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ARBOT_").split("__"))
            .extract()
            .with_context(|| format!("failed to load config from {path}"))
    }
}
