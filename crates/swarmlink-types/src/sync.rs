//! Replicated change records and hub-side session state.

use crate::clock::VectorClock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of change a [`SyncUpdate`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    /// A new row was created.
    Insert,
    /// An existing row changed.
    Update,
    /// A row was removed.
    Delete,
}

/// One replicated change, immutable once created.
///
/// The originating node owns the update until it is pushed; after that the
/// hub's per-tenant log does. `timestamp` is the tie-breaker for concurrent
/// updates (last write wins at merge time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUpdate {
    /// Unique update id.
    pub id: String,
    /// What kind of change this is.
    pub operation: SyncOperation,
    /// Logical table the change applies to.
    pub table: String,
    /// The changed row, as opaque JSON.
    pub data: serde_json::Value,
    /// Causal position of the change at its origin.
    pub vector_clock: VectorClock,
    /// Tenant that owns the change.
    pub tenant_id: String,
    /// Wall-clock creation time.
    pub timestamp: DateTime<Utc>,
}

impl SyncUpdate {
    /// Create an update with a fresh id stamped at the current time.
    pub fn new(
        operation: SyncOperation,
        table: impl Into<String>,
        data: serde_json::Value,
        vector_clock: VectorClock,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation,
            table: table.into(),
            data,
            vector_clock,
            tenant_id: tenant_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Hub-side record of one authenticated agent session.
///
/// Created on successful auth, touched on every pull and push, removed on
/// disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConnection {
    /// The connected agent.
    pub agent_id: String,
    /// The tenant the agent authenticated under.
    pub tenant_id: String,
    /// When the session was established.
    pub connected_at: DateTime<Utc>,
    /// When the agent last pulled or pushed.
    pub last_sync_at: DateTime<Utc>,
    /// The agent's clock as last reported.
    pub vector_clock: VectorClock,
}

impl AgentConnection {
    /// Create a fresh session record seeded with the agent's clock.
    pub fn new(
        agent_id: impl Into<String>,
        tenant_id: impl Into<String>,
        vector_clock: VectorClock,
    ) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            tenant_id: tenant_id.into(),
            connected_at: now,
            last_sync_at: now,
            vector_clock,
        }
    }
}

/// Point-in-time snapshot of hub state. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    /// Currently authenticated agents.
    pub connected_agents: usize,
    /// Updates stored across all tenant logs.
    pub total_episodes: usize,
    /// Distinct tenants known from open sessions or stored updates.
    pub tenants: usize,
    /// Seconds since the hub started.
    pub uptime_seconds: u64,
}

/// Point-in-time snapshot of one agent's sync activity. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// The agent these stats describe.
    pub agent_id: String,
    /// The agent's tenant.
    pub tenant_id: String,
    /// Whether a hub session is currently established.
    pub connected: bool,
    /// When the last successful sync finished.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Completed sync cycles.
    pub syncs_completed: u64,
    /// Failed sync cycles.
    pub syncs_failed: u64,
    /// Updates applied from the hub across all cycles.
    pub updates_pulled: u64,
    /// Updates sent to the hub across all cycles.
    pub updates_pushed: u64,
    /// The agent's current clock.
    pub vector_clock: VectorClock,
}
