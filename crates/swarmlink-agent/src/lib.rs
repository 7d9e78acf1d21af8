//! Short-lived swarmlink agents with hub-federated memory.
//!
//! An [`EphemeralAgent`] is spawned for one tenant with a fixed
//! lifetime, works against its own episode store, and dies on schedule.
//! When configured with a hub it syncs that store in the background and
//! around every task, so knowledge recorded by one agent reaches its
//! tenant's other agents while it is still useful.
//!
//! # Architecture
//!
//! - [`EphemeralAgent`] owns the lifecycle: spawn, execute, destroy.
//! - [`AgentConfig`] and [`HubHandle`] describe what to spawn and where
//!   it federates.
//! - [`EventLog`] keeps a bounded history of everything the agent and
//!   its hub client emitted.

pub mod agent;
pub mod config;
pub mod error;
pub mod events;

pub use agent::{AgentContext, EphemeralAgent, DEFAULT_RECALL_LIMIT};
pub use config::{AgentConfig, HubHandle, DEFAULT_LIFETIME_SECS, DEFAULT_SYNC_INTERVAL_MS};
pub use error::{AgentError, AgentResult};
pub use events::EventLog;
