//! Spawn-time configuration for ephemeral agents.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use swarmlink_hub::{HubServer, HubTransport, InProcessTransport};
use swarmlink_security::SecurityManager;

/// Agent lifetime when the caller does not pick one, in seconds.
pub const DEFAULT_LIFETIME_SECS: u64 = 300;

/// Interval between background sync cycles, in milliseconds.
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 5000;

/// How an agent reaches its hub.
///
/// The transport carries sync messages; the security manager mints the
/// agent's auth token and must share its secret with the hub the
/// transport leads to, or every auth will be rejected.
#[derive(Clone)]
pub struct HubHandle {
    /// Carries sync messages to the hub.
    pub transport: Arc<dyn HubTransport>,
    /// Issues agent tokens against the hub's secret.
    pub security: Arc<SecurityManager>,
}

impl HubHandle {
    /// Pair an arbitrary transport with the security manager of the hub
    /// it reaches.
    pub fn new(transport: Arc<dyn HubTransport>, security: Arc<SecurityManager>) -> Self {
        Self {
            transport,
            security,
        }
    }

    /// Handle to a hub living in the same process.
    pub fn in_process(server: Arc<HubServer>) -> Self {
        let security = server.security();
        Self {
            transport: Arc::new(InProcessTransport::new(server)),
            security,
        }
    }
}

impl fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubHandle").finish_non_exhaustive()
    }
}

/// Everything a spawn needs to know about the agent it is creating.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Tenant the agent belongs to.
    pub tenant_id: String,
    /// How long the agent lives, in seconds.
    pub lifetime_secs: u64,
    /// Interval between background sync cycles, in milliseconds.
    pub sync_interval_ms: u64,
    /// Where to keep the episode store. In memory when unset.
    pub memory_path: Option<PathBuf>,
    /// Accepted and recorded, but episode payloads are stored in clear
    /// text either way; at-rest encryption is not wired up yet.
    pub enable_encryption: bool,
    /// Hub to federate through. Agents without one work purely locally.
    pub hub: Option<HubHandle>,
}

impl AgentConfig {
    /// Defaults for a tenant: five-minute lifetime, five-second sync
    /// interval, in-memory store, no hub.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            lifetime_secs: DEFAULT_LIFETIME_SECS,
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            memory_path: None,
            enable_encryption: true,
            hub: None,
        }
    }

    /// Set the agent's lifetime in seconds.
    pub fn with_lifetime_secs(mut self, secs: u64) -> Self {
        self.lifetime_secs = secs;
        self
    }

    /// Set the background sync interval in milliseconds.
    pub fn with_sync_interval_ms(mut self, ms: u64) -> Self {
        self.sync_interval_ms = ms;
        self
    }

    /// Keep the episode store on disk at `path`.
    pub fn with_memory_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.memory_path = Some(path.into());
        self
    }

    /// Toggle the at-rest encryption flag.
    pub fn with_encryption(mut self, enabled: bool) -> Self {
        self.enable_encryption = enabled;
        self
    }

    /// Federate through `hub`.
    pub fn with_hub(mut self, hub: HubHandle) -> Self {
        self.hub = Some(hub);
        self
    }
}
