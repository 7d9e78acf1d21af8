//! Error types for ephemeral agents.

use thiserror::Error;

/// Errors raised by an ephemeral agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent has released its context; it was destroyed.
    #[error("Agent is not initialized")]
    NotInitialized,

    /// The agent's lifetime ran out.
    #[error("Agent lifetime has expired")]
    Expired,

    /// A hub interaction failed.
    #[error("Hub error: {0}")]
    Hub(#[from] swarmlink_hub::HubError),

    /// The local episode store failed.
    #[error("Memory error: {0}")]
    Memory(#[from] swarmlink_memory::MemoryError),

    /// A task handed to [`crate::agent::EphemeralAgent::execute`] failed.
    #[error("Task failed: {0}")]
    Task(String),
}

/// Convenience alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
