//! Hub configuration loading from TOML, with defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuration for a [`crate::server::HubServer`].
///
/// Every field has a default so a hub can start from an empty file or no
/// file at all. When `secret` is unset the hub generates a random one at
/// startup; tokens must then be minted through the hub's own
/// [`crate::server::HubServer::security`] handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Port the hub advertises to agents.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Optional SQLite file for write-through persistence of pushed
    /// updates. Unset keeps the hub fully in-memory.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Maximum number of concurrently connected agents.
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    /// Sync interval hint handed to agents, in milliseconds.
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    /// Shared secret for token signing and tenant key derivation.
    #[serde(default)]
    pub secret: Option<String>,
}

fn default_port() -> u16 {
    8443
}

fn default_max_agents() -> usize {
    100
}

fn default_sync_interval_ms() -> u64 {
    5000
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            db_path: None,
            max_agents: default_max_agents(),
            sync_interval_ms: default_sync_interval_ms(),
            secret: None,
        }
    }
}

impl HubConfig {
    /// Load hub configuration from a TOML file, with defaults.
    ///
    /// Missing files and parse failures fall back to defaults rather than
    /// erroring; a hub must be able to start unconfigured.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            info!(path = %path.display(), "Hub config not found, using defaults");
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<HubConfig>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "Loaded hub configuration");
                    config
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        path = %path.display(),
                        "Failed to parse hub config, using defaults"
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!(
                    error = %e,
                    path = %path.display(),
                    "Failed to read hub config, using defaults"
                );
                Self::default()
            }
        }
    }
}
