//! The agent supervisor: one actor per user, bounded capacity.
//!
//! Agents are independent: each runs in its own task with its own
//! adapters, store, and channels, so one agent's failure cannot reach
//! another. Creation beyond the configured capacity fails fast.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::info;

use arbot_core::AgentConfig;
use arbot_engine::{Agent, AgentDeps, AgentStatus};

use crate::actor::AgentActor;
use crate::commands::AgentCommand;
use crate::handle::AgentHandle;

/// Command channel depth per agent.
const COMMAND_BUFFER: usize = 32;

/// Everything needed to create one agent.
pub struct CreateAgent {
    /// Owning user.
    pub user_id: String,
    /// Initial configuration.
    pub config: AgentConfig,
    /// Venue adapters, feeds, catalog, and repository, all bound to the
    /// user's signer where applicable.
    pub deps: AgentDeps,
}

/// Owns the `user_id → agent` map.
pub struct AgentSupervisor {
    agents: RwLock<HashMap<String, AgentHandle>>,
    max_agents: usize,
}

impl std::fmt::Debug for AgentSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSupervisor")
            .field("max_agents", &self.max_agents)
            .finish_non_exhaustive()
    }
}

impl AgentSupervisor {
    /// Creates a supervisor bounded to `max_agents` live agents.
    #[must_use]
    pub fn new(max_agents: usize) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            max_agents,
        }
    }

    /// Creates an agent and spawns its actor task. The agent starts in
    /// the stopped state.
    ///
    /// # Errors
    /// Fails fast when the user already has an agent or the capacity
    /// bound is reached.
    pub async fn create(&self, request: CreateAgent) -> Result<AgentHandle> {
        let mut agents = self.agents.write().await;
        if agents.contains_key(&request.user_id) {
            bail!("agent already exists for user {}", request.user_id);
        }
        if agents.len() >= self.max_agents {
            bail!(
                "agent capacity reached: {} of {}",
                agents.len(),
                self.max_agents
            );
        }

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);

        let agent = Arc::new(Agent::new(
            request.user_id.clone(),
            request.config,
            request.deps,
            shutdown_rx,
        ));
        let (status_tx, status_rx) = watch::channel(agent.status(false));

        let handle = AgentHandle::new(tx, status_rx, shutdown_tx.clone());
        let actor = AgentActor::new(agent, rx, status_tx, shutdown_tx);
        let user_id = request.user_id.clone();
        let task = tokio::spawn(actor.run());
        let crashed_user = user_id.clone();
        tokio::spawn(async move {
            // A panic in one actor is recorded here and reaches no other
            // agent.
            if let Err(e) = task.await {
                tracing::error!(user_id = %crashed_user, error = %e, "agent actor crashed");
            }
        });

        agents.insert(request.user_id, handle.clone());
        info!(user_id = %user_id, "agent created");
        Ok(handle)
    }

    /// Starts a user's agent.
    ///
    /// # Errors
    /// Returns an error for an unknown user or a dead actor.
    pub async fn start(&self, user_id: &str) -> Result<()> {
        self.handle(user_id).await?.start().await
    }

    /// Stops a user's agent gracefully.
    ///
    /// # Errors
    /// Returns an error for an unknown user or a dead actor.
    pub async fn stop(&self, user_id: &str) -> Result<()> {
        self.handle(user_id).await?.stop().await
    }

    /// Shuts down and removes a user's agent.
    ///
    /// # Errors
    /// Returns an error for an unknown user.
    pub async fn remove(&self, user_id: &str) -> Result<()> {
        let handle = self.agents.write().await.remove(user_id);
        match handle {
            Some(handle) => {
                // The actor may already be gone; removal still succeeds.
                let _ = handle.shutdown().await;
                info!(user_id, "agent removed");
                Ok(())
            }
            None => bail!("no agent for user {user_id}"),
        }
    }

    /// Returns the latest status for a user's agent.
    pub async fn status(&self, user_id: &str) -> Option<AgentStatus> {
        self.agents
            .read()
            .await
            .get(user_id)
            .map(AgentHandle::status)
    }

    /// Returns a handle for a user's agent.
    ///
    /// # Errors
    /// Returns an error for an unknown user.
    pub async fn handle(&self, user_id: &str) -> Result<AgentHandle> {
        self.agents
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no agent for user {user_id}"))
    }

    /// Lists the user ids with live agents, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut users: Vec<String> = self.agents.read().await.keys().cloned().collect();
        users.sort();
        users
    }

    /// Returns the number of live agents.
    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Returns true when no agents are live.
    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    /// Shuts down every agent.
    pub async fn shutdown_all(&self) {
        let handles: Vec<AgentHandle> = {
            let mut agents = self.agents.write().await;
            agents.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            let _ = handle.shutdown().await;
        }
        info!("all agents shut down");
    }

    /// Sends a command to a user's agent.
    ///
    /// # Errors
    /// Returns an error for an unknown user or a dead actor.
    pub async fn send(&self, user_id: &str, command: AgentCommand) -> Result<()> {
        let handle = self.handle(user_id).await?;
        match command {
            AgentCommand::Start => handle.start().await,
            AgentCommand::Stop => handle.stop().await,
            AgentCommand::Resume => handle.resume().await,
            AgentCommand::UpdateConfig(config) => handle.update_config(*config).await,
            AgentCommand::Shutdown => handle.shutdown().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbot_core::{MemoryTradeRepository, Venue};
    use arbot_engine::testkit::{ScriptedAdapter, ScriptedFeed};
    use arbot_engine::{MarketCatalog, MarketMeta, MarketTokens};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn fast_config() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.scan_interval_ms = 10;
        config.fill_poll_interval_ms = 5;
        config.fill_poll_timeout_ms = 20;
        config
    }

    fn deps(with_arb: bool) -> AgentDeps {
        let catalog = MarketCatalog::new();
        catalog.upsert(
            MarketMeta::new("0xabc")
                .with_venue(Venue::Amm, MarketTokens::new("amm-yes", "amm-no"))
                .with_venue(Venue::Clob, MarketTokens::new("clob-yes", "clob-no")),
        );

        let amm_feed = if with_arb {
            ScriptedFeed::new(Venue::Amm).with_quote("0xabc", dec!(0.45), dec!(0.60), dec!(100))
        } else {
            ScriptedFeed::new(Venue::Amm)
        };
        let clob_feed = if with_arb {
            ScriptedFeed::new(Venue::Clob).with_quote("0xabc", dec!(0.60), dec!(0.48), dec!(100))
        } else {
            ScriptedFeed::new(Venue::Clob)
        };

        AgentDeps {
            venue_a: Arc::new(ScriptedAdapter::new(Venue::Amm)),
            venue_b: Arc::new(ScriptedAdapter::new(Venue::Clob)),
            feeds: vec![Arc::new(amm_feed), Arc::new(clob_feed)],
            catalog: Arc::new(catalog),
            repo: Arc::new(MemoryTradeRepository::new()),
        }
    }

    fn create_request(user_id: &str) -> CreateAgent {
        CreateAgent {
            user_id: user_id.to_string(),
            config: fast_config(),
            deps: deps(false),
        }
    }

    #[tokio::test]
    async fn test_create_and_status() {
        let supervisor = AgentSupervisor::new(4);
        supervisor.create(create_request("user-1")).await.unwrap();

        let status = supervisor.status("user-1").await.unwrap();
        assert_eq!(status.user_id, "user-1");
        assert!(!status.running);
        assert!(supervisor.status("user-2").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_user_fails_fast() {
        let supervisor = AgentSupervisor::new(4);
        supervisor.create(create_request("user-1")).await.unwrap();
        assert!(supervisor.create(create_request("user-1")).await.is_err());
    }

    #[tokio::test]
    async fn test_capacity_bound_fails_fast() {
        let supervisor = AgentSupervisor::new(2);
        supervisor.create(create_request("user-1")).await.unwrap();
        supervisor.create(create_request("user-2")).await.unwrap();

        let error = supervisor.create(create_request("user-3")).await.unwrap_err();
        assert!(error.to_string().contains("capacity"));
        assert_eq!(supervisor.len().await, 2);
    }

    #[tokio::test]
    async fn test_start_and_stop_round_trip() {
        let supervisor = AgentSupervisor::new(4);
        let mut handle = supervisor.create(create_request("user-1")).await.unwrap();

        supervisor.start("user-1").await.unwrap();
        let status = handle.status_changed().await.unwrap();
        assert!(status.running);

        supervisor.stop("user-1").await.unwrap();
        let status = handle.status_changed().await.unwrap();
        assert!(!status.running);
    }

    #[tokio::test]
    async fn test_running_agent_scans() {
        let supervisor = AgentSupervisor::new(4);
        let handle = supervisor.create(create_request("user-1")).await.unwrap();
        supervisor.start("user-1").await.unwrap();

        // A few ticks of the 10ms scan interval.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(handle.status().last_scan.is_some());

        supervisor.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_remove_deletes_agent() {
        let supervisor = AgentSupervisor::new(4);
        supervisor.create(create_request("user-1")).await.unwrap();
        supervisor.remove("user-1").await.unwrap();

        assert!(supervisor.is_empty().await);
        assert!(supervisor.remove("user-1").await.is_err());
    }

    #[tokio::test]
    async fn test_agents_are_isolated() {
        let supervisor = AgentSupervisor::new(4);
        // user-1 gets a broken quote feed; user-2 is healthy.
        let mut broken = create_request("user-1");
        broken.deps.feeds = vec![Arc::new(ScriptedFeed::new(Venue::Amm).failing())];
        supervisor.create(broken).await.unwrap();
        supervisor.create(create_request("user-2")).await.unwrap();

        supervisor.start("user-1").await.unwrap();
        supervisor.start("user-2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        // The broken agent keeps publishing, and the healthy one scans.
        assert!(supervisor.status("user-1").await.unwrap().running);
        let healthy = supervisor.status("user-2").await.unwrap();
        assert!(healthy.running);
        assert!(healthy.last_scan.is_some());

        supervisor.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_update_config_between_scans() {
        let supervisor = AgentSupervisor::new(4);
        let handle = supervisor.create(create_request("user-1")).await.unwrap();

        let mut config = fast_config();
        config.min_spread_bps = dec!(999);
        handle.update_config(config).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(handle.status().config.min_spread_bps, dec!(999));
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let supervisor = AgentSupervisor::new(4);
        supervisor.create(create_request("user-b")).await.unwrap();
        supervisor.create(create_request("user-a")).await.unwrap();

        assert_eq!(supervisor.list().await, vec!["user-a", "user-b"]);
    }
}
