//! Cloneable handle to a running agent actor.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use arbot_core::AgentConfig;
use arbot_engine::AgentStatus;

use crate::commands::AgentCommand;

/// Handle through which the supervisor (and its API surface) drives one
/// agent.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<AgentCommand>,
    status_rx: watch::Receiver<AgentStatus>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("user_id", &self.status_rx.borrow().user_id)
            .finish_non_exhaustive()
    }
}

impl AgentHandle {
    /// Creates a handle.
    #[must_use]
    pub fn new(
        tx: mpsc::Sender<AgentCommand>,
        status_rx: watch::Receiver<AgentStatus>,
        shutdown_tx: Arc<watch::Sender<bool>>,
    ) -> Self {
        Self {
            tx,
            status_rx,
            shutdown_tx,
        }
    }

    /// Starts the agent's scan loop.
    ///
    /// # Errors
    /// Returns an error if the actor is gone.
    pub async fn start(&self) -> Result<()> {
        self.tx.send(AgentCommand::Start).await?;
        Ok(())
    }

    /// Stops the agent gracefully. The shutdown signal goes out first so
    /// in-flight fill and unwind polls abort without waiting for the
    /// current cycle to drain.
    ///
    /// # Errors
    /// Returns an error if the actor is gone.
    pub async fn stop(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.tx.send(AgentCommand::Stop).await?;
        Ok(())
    }

    /// Clears an operator-resolvable pause.
    ///
    /// # Errors
    /// Returns an error if the actor is gone.
    pub async fn resume(&self) -> Result<()> {
        self.tx.send(AgentCommand::Resume).await?;
        Ok(())
    }

    /// Replaces the agent configuration between scans.
    ///
    /// # Errors
    /// Returns an error if the actor is gone.
    pub async fn update_config(&self, config: AgentConfig) -> Result<()> {
        self.tx
            .send(AgentCommand::UpdateConfig(Box::new(config)))
            .await?;
        Ok(())
    }

    /// Stops the agent and terminates its actor task.
    ///
    /// # Errors
    /// Returns an error if the actor is gone.
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.tx.send(AgentCommand::Shutdown).await?;
        Ok(())
    }

    /// Returns the latest published status.
    #[must_use]
    pub fn status(&self) -> AgentStatus {
        self.status_rx.borrow().clone()
    }

    /// Waits until the actor publishes a status change.
    ///
    /// # Errors
    /// Returns an error if the actor is gone.
    pub async fn status_changed(&mut self) -> Result<AgentStatus> {
        self.status_rx.changed().await?;
        Ok(self.status_rx.borrow().clone())
    }
}
