//! Commands accepted by an agent actor.

use arbot_core::AgentConfig;

/// Control messages sent through an [`crate::AgentHandle`].
#[derive(Debug)]
pub enum AgentCommand {
    /// Begin scanning. Runs startup work (approvals, auth, position
    /// reload) on the first start.
    Start,
    /// Stop scanning gracefully: abort in-flight polls and cancel the
    /// legs of any open position.
    Stop,
    /// Operator action: clear a pause left by a failed unwind.
    Resume,
    /// Replace the configuration. Applied between scans, never
    /// mid-execution.
    UpdateConfig(Box<AgentConfig>),
    /// Stop and terminate the actor task.
    Shutdown,
}
