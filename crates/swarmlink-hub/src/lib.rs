//! Swarmlink federation protocol: sync hub and hub client.
//!
//! Agents of one tenant stay consistent by syncing through a central hub
//! with vector-clock causality tracking and last-write-wins conflict
//! resolution.
//!
//! ## Architecture
//!
//! - **HubServer**: Multi-tenant sync endpoint with per-tenant update logs
//! - **HubClient**: One agent's session and its pull/push sync cycle
//! - **SyncMessage**: JSON protocol messages tagged by `type`
//! - **HubTransport**: Trait for delivering messages to a hub

pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod registry;
pub mod server;
pub mod transport;

pub use client::{HubClient, SyncOutcome};
pub use config::HubConfig;
pub use error::{HubError, HubResult};
pub use message::SyncMessage;
pub use registry::ConnectionRegistry;
pub use server::HubServer;
pub use transport::{HubTransport, InProcessTransport};
