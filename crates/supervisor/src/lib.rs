//! Agent lifecycle supervision.
//!
//! The supervisor owns the process-wide `user_id → agent` map and
//! nothing else global. Each agent runs as an independent actor task
//! behind an [`AgentHandle`]; commands flow over an mpsc channel and
//! status flows back over a watch channel.

pub mod actor;
pub mod commands;
pub mod handle;
pub mod registry;

pub use actor::AgentActor;
pub use commands::AgentCommand;
pub use handle::AgentHandle;
pub use registry::{AgentSupervisor, CreateAgent};
