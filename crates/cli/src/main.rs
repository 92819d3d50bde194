//! `arbot`: run cross-venue arbitrage agents from a config file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

use arbot_core::adapter::{QuoteFeed, VenueAdapter};
use arbot_core::{KeySigner, MemoryTradeRepository, Signer, Venue};
use arbot_engine::{AgentDeps, MarketCatalog, MarketMeta, MarketTokens};
use arbot_supervisor::{AgentSupervisor, CreateAgent};
use arbot_venue_amm::{AmmVenue, AmmVenueConfig};
use arbot_venue_clob::{ClobVenue, ClobVenueConfig};

mod config;

use config::{AppConfig, UserEntry};

#[derive(Parser)]
#[command(name = "arbot")]
#[command(about = "Cross-venue arbitrage agents for binary prediction markets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run agents for every configured user until Ctrl-C
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/arbot.toml")]
        config: String,
    },
    /// Validate a config file and print the resolved agents
    Check {
        /// Config file path
        #[arg(short, long, default_value = "config/arbot.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run_agents(&config).await,
        Commands::Check { config } => check_config(&config),
    }
}

fn build_catalog(app: &AppConfig) -> Arc<MarketCatalog> {
    let catalog = MarketCatalog::new();
    for market in &app.markets {
        let mut meta = MarketMeta::new(market.market_id.clone())
            .with_venue(
                Venue::Amm,
                MarketTokens::new(market.amm_yes_token.clone(), market.amm_no_token.clone()),
            )
            .with_venue(
                Venue::Clob,
                MarketTokens::new(market.clob_yes_token.clone(), market.clob_no_token.clone()),
            );
        if let Some(resolves_at) = market.resolves_at {
            meta = meta.with_resolves_at(resolves_at);
        }
        catalog.upsert(meta);
    }
    Arc::new(catalog)
}

fn build_deps(app: &AppConfig, user: &UserEntry, catalog: Arc<MarketCatalog>) -> Result<AgentDeps> {
    let key = std::env::var(&user.private_key_env).with_context(|| {
        format!(
            "missing private key env var {} for user {}",
            user.private_key_env, user.user_id
        )
    })?;
    let signer: Arc<dyn Signer> = Arc::new(
        KeySigner::from_private_key(&key, app.chain_id)
            .with_context(|| format!("bad private key for user {}", user.user_id))?,
    );

    let dry_run = user.config.execution_mode.is_dry_run();
    let amm = Arc::new(
        AmmVenue::new(
            AmmVenueConfig {
                base_url: app.amm.base_url.clone(),
                chain_id: app.chain_id,
                dry_run: dry_run || app.amm.dry_run,
                ..Default::default()
            },
            signer.clone(),
        )
        .context("failed to build AMM venue client")?,
    );
    let clob = Arc::new(
        ClobVenue::new(
            ClobVenueConfig {
                base_url: app.clob.base_url.clone(),
                chain_id: app.chain_id,
                dry_run: dry_run || app.clob.dry_run,
                ..Default::default()
            },
            signer,
        )
        .context("failed to build CLOB venue client")?,
    );

    let venue_a: Arc<dyn VenueAdapter> = amm.clone();
    let venue_b: Arc<dyn VenueAdapter> = clob.clone();
    let feeds: Vec<Arc<dyn QuoteFeed>> =
        vec![amm as Arc<dyn QuoteFeed>, clob as Arc<dyn QuoteFeed>];

    Ok(AgentDeps {
        venue_a,
        venue_b,
        feeds,
        catalog,
        // Trade rows live in the external store in production; the CLI
        // runner keeps them in memory.
        repo: Arc::new(MemoryTradeRepository::new()),
    })
}

async fn run_agents(config_path: &str) -> Result<()> {
    let app = AppConfig::load(config_path)?;
    if app.users.is_empty() {
        anyhow::bail!("no users configured in {config_path}");
    }

    let catalog = build_catalog(&app);
    info!(
        markets = catalog.len(),
        users = app.users.len(),
        "starting supervisor"
    );

    let supervisor = AgentSupervisor::new(app.max_agents);
    for user in &app.users {
        user.config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid config for {}: {e}", user.user_id))?;
        let deps = build_deps(&app, user, catalog.clone())?;
        supervisor
            .create(CreateAgent {
                user_id: user.user_id.clone(),
                config: user.config.clone(),
                deps,
            })
            .await?;
        supervisor.start(&user.user_id).await?;
    }

    info!("agents running; Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    warn!("shutting down");
    supervisor.shutdown_all().await;
    Ok(())
}

fn check_config(config_path: &str) -> Result<()> {
    let app = AppConfig::load(config_path)?;
    for user in &app.users {
        user.config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid config for {}: {e}", user.user_id))?;
        println!(
            "{}: mode={} markets={}",
            user.user_id,
            user.config.execution_mode,
            app.markets.len()
        );
    }
    println!("config ok: {} users, {} markets", app.users.len(), app.markets.len());
    Ok(())
}
