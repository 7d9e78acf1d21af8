//! Authentication tokens and per-tenant confidentiality for swarmlink.
//!
//! The [`SecurityManager`] issues and verifies the three-segment signed
//! tokens agents present to the hub, and derives cached per-tenant keys for
//! authenticated encryption. It never routes messages or stores data; the
//! single tenant-isolation gate it exposes, [`SecurityManager::validate_tenant_access`],
//! is what every storage operation calls before touching cross-tenant data.

pub mod error;
pub mod manager;
pub mod token;

pub use error::{SecurityError, SecurityResult};
pub use manager::SecurityManager;
pub use token::{AgentTokenPayload, EncryptedPayload, TenantKeys};
