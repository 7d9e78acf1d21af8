//! Connection registry: tracks authenticated agent sessions.
//!
//! The [`ConnectionRegistry`] is a thread-safe structure recording every
//! agent with an open hub session, the clock it last reported, and a
//! bounded outbox of broadcasts awaiting delivery.

use crate::message::SyncMessage;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use swarmlink_types::{AgentConnection, VectorClock};
use tracing::debug;

/// Broadcasts queued per agent before the oldest is dropped.
const MAX_OUTBOX: usize = 1024;

#[derive(Debug, Clone)]
struct ConnectionEntry {
    connection: AgentConnection,
    outbox: VecDeque<SyncMessage>,
}

/// Thread-safe registry of all open agent sessions.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    agents: Arc<RwLock<HashMap<String, ConnectionEntry>>>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a session after successful auth. Re-auth replaces the
    /// existing entry, dropping any queued broadcasts.
    pub fn register(&self, connection: AgentConnection) {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        agents.insert(
            connection.agent_id.clone(),
            ConnectionEntry {
                connection,
                outbox: VecDeque::new(),
            },
        );
    }

    /// Remove a session entirely.
    pub fn remove(&self, agent_id: &str) -> Option<AgentConnection> {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        agents.remove(agent_id).map(|entry| entry.connection)
    }

    /// Whether an agent has an open session.
    pub fn contains(&self, agent_id: &str) -> bool {
        let agents = self.agents.read().unwrap_or_else(|e| e.into_inner());
        agents.contains_key(agent_id)
    }

    /// Snapshot of one session.
    pub fn get(&self, agent_id: &str) -> Option<AgentConnection> {
        let agents = self.agents.read().unwrap_or_else(|e| e.into_inner());
        agents.get(agent_id).map(|entry| entry.connection.clone())
    }

    /// Fold a reported clock into the session record and stamp the sync
    /// time. No-op for unknown agents.
    pub fn record_sync(&self, agent_id: &str, remote: &VectorClock) {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = agents.get_mut(agent_id) {
            entry.connection.vector_clock = entry.connection.vector_clock.merge(remote);
            entry.connection.last_sync_at = Utc::now();
        }
    }

    /// Queue a broadcast for later delivery to one agent. The oldest
    /// broadcast is dropped once the outbox is full.
    pub fn queue_broadcast(&self, agent_id: &str, msg: SyncMessage) {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = agents.get_mut(agent_id) {
            if entry.outbox.len() >= MAX_OUTBOX {
                entry.outbox.pop_front();
                debug!(agent_id, "Outbox full, dropped oldest broadcast");
            }
            entry.outbox.push_back(msg);
        }
    }

    /// Take every queued broadcast for an agent, oldest first.
    pub fn drain_outbox(&self, agent_id: &str) -> Vec<SyncMessage> {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        match agents.get_mut(agent_id) {
            Some(entry) => entry.outbox.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Snapshots of every session in a tenant.
    pub fn tenant_agents(&self, tenant_id: &str) -> Vec<AgentConnection> {
        let agents = self.agents.read().unwrap_or_else(|e| e.into_inner());
        agents
            .values()
            .filter(|entry| entry.connection.tenant_id == tenant_id)
            .map(|entry| entry.connection.clone())
            .collect()
    }

    /// Snapshots of every session.
    pub fn all(&self) -> Vec<AgentConnection> {
        let agents = self.agents.read().unwrap_or_else(|e| e.into_inner());
        agents.values().map(|entry| entry.connection.clone()).collect()
    }

    /// Distinct tenants with at least one session.
    pub fn tenants(&self) -> HashSet<String> {
        let agents = self.agents.read().unwrap_or_else(|e| e.into_inner());
        agents
            .values()
            .map(|entry| entry.connection.tenant_id.clone())
            .collect()
    }

    /// Number of open sessions.
    pub fn count(&self) -> usize {
        let agents = self.agents.read().unwrap_or_else(|e| e.into_inner());
        agents.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(agent_id: &str, tenant_id: &str) -> AgentConnection {
        AgentConnection::new(agent_id, tenant_id, VectorClock::with_node(agent_id))
    }

    #[test]
    fn test_register_and_get() {
        let registry = ConnectionRegistry::new();
        registry.register(make_connection("a1", "t1"));

        let conn = registry.get("a1").unwrap();
        assert_eq!(conn.agent_id, "a1");
        assert_eq!(conn.tenant_id, "t1");
        assert!(registry.contains("a1"));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_remove() {
        let registry = ConnectionRegistry::new();
        registry.register(make_connection("a1", "t1"));

        let removed = registry.remove("a1");
        assert!(removed.is_some());
        assert_eq!(registry.count(), 0);
        assert!(registry.remove("a1").is_none());
    }

    #[test]
    fn test_record_sync_merges_clock_and_touches_time() {
        let registry = ConnectionRegistry::new();
        registry.register(make_connection("a1", "t1"));
        let before = registry.get("a1").unwrap();

        let remote = VectorClock::new().increment("a1").increment("hub");
        registry.record_sync("a1", &remote);

        let after = registry.get("a1").unwrap();
        assert_eq!(after.vector_clock.get("a1"), 1);
        assert_eq!(after.vector_clock.get("hub"), 1);
        assert!(after.last_sync_at >= before.last_sync_at);
    }

    #[test]
    fn test_tenant_agents_filters() {
        let registry = ConnectionRegistry::new();
        registry.register(make_connection("a1", "t1"));
        registry.register(make_connection("a2", "t1"));
        registry.register(make_connection("b1", "t2"));

        let t1 = registry.tenant_agents("t1");
        assert_eq!(t1.len(), 2);
        assert!(t1.iter().all(|c| c.tenant_id == "t1"));
        assert_eq!(registry.tenants().len(), 2);
    }

    #[test]
    fn test_outbox_queue_and_drain() {
        let registry = ConnectionRegistry::new();
        registry.register(make_connection("a1", "t1"));

        registry.queue_broadcast("a1", SyncMessage::error("one"));
        registry.queue_broadcast("a1", SyncMessage::error("two"));

        let drained = registry.drain_outbox("a1");
        assert_eq!(drained.len(), 2);
        assert!(registry.drain_outbox("a1").is_empty());
        assert!(registry.drain_outbox("unknown").is_empty());
    }

    #[test]
    fn test_outbox_drops_oldest_when_full() {
        let registry = ConnectionRegistry::new();
        registry.register(make_connection("a1", "t1"));

        for i in 0..(MAX_OUTBOX + 5) {
            registry.queue_broadcast("a1", SyncMessage::error(format!("m{i}")));
        }

        let drained = registry.drain_outbox("a1");
        assert_eq!(drained.len(), MAX_OUTBOX);
        match &drained[0] {
            SyncMessage::Error { error, .. } => assert_eq!(error, "m5"),
            other => panic!("Expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_reauth_replaces_entry() {
        let registry = ConnectionRegistry::new();
        registry.register(make_connection("a1", "t1"));
        registry.queue_broadcast("a1", SyncMessage::error("stale"));

        registry.register(make_connection("a1", "t1"));
        assert_eq!(registry.count(), 1);
        assert!(registry.drain_outbox("a1").is_empty());
    }
}
