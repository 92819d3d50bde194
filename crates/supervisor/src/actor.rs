//! The agent actor: one task per user, driven by commands and a scan
//! interval.
//!
//! Scans never overlap: the cycle is awaited inside the actor loop, and
//! the interval skips ticks that fire while a cycle is still running.
//! A stop arriving mid-cycle takes effect through the shutdown watch
//! channel (aborting poll sleeps) and is then processed as soon as the
//! cycle returns.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use arbot_engine::{Agent, AgentStatus, CycleOutcome};

use crate::commands::AgentCommand;

/// Drives one [`Agent`] until shut down.
pub struct AgentActor {
    agent: Arc<Agent>,
    rx: mpsc::Receiver<AgentCommand>,
    status_tx: watch::Sender<AgentStatus>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    running: bool,
    started_once: bool,
}

impl AgentActor {
    /// Creates an actor in the stopped state.
    #[must_use]
    pub fn new(
        agent: Arc<Agent>,
        rx: mpsc::Receiver<AgentCommand>,
        status_tx: watch::Sender<AgentStatus>,
        shutdown_tx: Arc<watch::Sender<bool>>,
    ) -> Self {
        Self {
            agent,
            rx,
            status_tx,
            shutdown_tx,
            running: false,
            started_once: false,
        }
    }

    /// Runs the actor loop to completion.
    pub async fn run(mut self) {
        let mut interval = self.make_interval();

        loop {
            tokio::select! {
                maybe_command = self.rx.recv() => {
                    let Some(command) = maybe_command else { break };
                    if self.handle_command(command, &mut interval).await {
                        break;
                    }
                }
                _ = interval.tick(), if self.running => {
                    let outcome = self.agent.run_cycle().await;
                    if let CycleOutcome::SessionEnded(reason) = &outcome {
                        info!(
                            user_id = %self.agent.user_id(),
                            reason = %reason,
                            "session ended, stopping agent"
                        );
                        self.running = false;
                        self.agent.shutdown_cleanup().await;
                    }
                    self.publish();
                }
            }
        }
        debug!(user_id = %self.agent.user_id(), "agent actor terminated");
    }

    /// Handles one command; returns true when the actor should exit.
    async fn handle_command(
        &mut self,
        command: AgentCommand,
        interval: &mut tokio::time::Interval,
    ) -> bool {
        match command {
            AgentCommand::Start => {
                if !self.running {
                    let _ = self.shutdown_tx.send(false);
                    if !self.started_once {
                        self.agent.init().await;
                        self.started_once = true;
                    }
                    self.running = true;
                    *interval = self.make_interval();
                    info!(user_id = %self.agent.user_id(), "agent started");
                }
            }
            AgentCommand::Stop => {
                if self.running {
                    self.running = false;
                    self.agent.shutdown_cleanup().await;
                    info!(user_id = %self.agent.user_id(), "agent stopped");
                }
            }
            AgentCommand::Resume => {
                self.agent.operator_resume();
            }
            AgentCommand::UpdateConfig(config) => {
                self.agent.update_config(*config);
                *interval = self.make_interval();
            }
            AgentCommand::Shutdown => {
                if self.running {
                    self.running = false;
                    self.agent.shutdown_cleanup().await;
                }
                self.publish();
                return true;
            }
        }
        self.publish();
        false
    }

    fn make_interval(&self) -> tokio::time::Interval {
        let period = Duration::from_millis(self.agent.status(self.running).config.scan_interval_ms);
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        // A tick firing while a cycle is still running is coalesced, not
        // queued.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }

    fn publish(&self) {
        let _ = self.status_tx.send(self.agent.status(self.running));
    }
}
