//! Credential and key material types.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Claims carried by an agent auth token. Immutable once issued; verified,
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTokenPayload {
    /// The agent the token was issued to.
    pub agent_id: String,
    /// The tenant the agent belongs to.
    pub tenant_id: String,
    /// Expiry as unix milliseconds.
    pub expires_at: i64,
    /// Issue time as unix milliseconds, stamped by the issuer.
    #[serde(default)]
    pub iat: i64,
}

impl AgentTokenPayload {
    /// Create claims for an agent expiring at `expires_at` (unix ms).
    pub fn new(
        agent_id: impl Into<String>,
        tenant_id: impl Into<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            tenant_id: tenant_id.into(),
            expires_at,
            iat: 0,
        }
    }

    /// True when the expiry lies in the past.
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now().timestamp_millis()
    }
}

/// Per-tenant symmetric key material, derived once and cached.
#[derive(Clone, PartialEq, Eq)]
pub struct TenantKeys {
    /// AES-256 key bytes, derived from the tenant id and shared secret.
    pub key: [u8; 32],
    /// GCM nonce bytes, random on first derivation, then reused for the
    /// manager's lifetime (see `SecurityManager::tenant_keys`).
    pub nonce: [u8; 12],
}

impl std::fmt::Debug for TenantKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantKeys")
            .field("key", &"<redacted>")
            .field("nonce", &"<redacted>")
            .finish()
    }
}

/// Ciphertext with its detached authentication tag, both hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    /// Hex-encoded AES-256-GCM ciphertext.
    pub ciphertext: String,
    /// Hex-encoded 16-byte authentication tag.
    pub auth_tag: String,
}
