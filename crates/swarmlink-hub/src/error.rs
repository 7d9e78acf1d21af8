//! Error types for the hub and its client.

use thiserror::Error;

/// Errors raised by the sync hub and the hub client.
#[derive(Debug, Error)]
pub enum HubError {
    /// The client has no established hub session.
    #[error("Not connected to the sync hub")]
    NotConnected,

    /// The hub refused the client's credentials.
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// A pull or push referenced an agent with no session.
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// A pushed update named a tenant other than the session's tenant.
    /// The whole batch is discarded.
    #[error("Tenant isolation violation: agent in tenant '{agent_tenant}' pushed data for tenant '{update_tenant}'")]
    TenantIsolationViolation {
        /// Tenant the pushing agent authenticated under.
        agent_tenant: String,
        /// Tenant named by the offending update.
        update_tenant: String,
    },

    /// The transport failed to deliver a message.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote side sent something the protocol does not allow here.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Token or payload crypto failed.
    #[error("Security error: {0}")]
    Security(#[from] swarmlink_security::SecurityError),

    /// The local episode store failed.
    #[error("Memory error: {0}")]
    Memory(#[from] swarmlink_memory::MemoryError),

    /// A message could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias for hub operations.
pub type HubResult<T> = Result<T, HubError>;
