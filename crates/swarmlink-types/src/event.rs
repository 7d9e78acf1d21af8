//! Typed federation events.
//!
//! Components fan these out over broadcast channels rather than through a
//! string-keyed global emitter: any number of subscribers, no delivery
//! ordering guarantee, and a lagging subscriber never blocks the sender.

use crate::clock::VectorClock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FederationEventKind {
    /// A hub session was established.
    Connected,
    /// A hub session ended.
    Disconnected,
    /// A sync cycle began.
    SyncStarted,
    /// A sync cycle finished.
    SyncCompleted {
        /// How long the cycle took.
        duration_ms: u64,
        /// Updates applied from the hub.
        pulled: usize,
        /// Updates sent to the hub.
        pushed: usize,
    },
    /// A sync cycle failed; the agent keeps running on stale data.
    SyncFailed {
        /// Why the cycle failed.
        reason: String,
    },
    /// A pulled update was concurrent with local state. Resolution is
    /// last-write-wins by timestamp, applied during merge.
    ConflictDetected {
        /// The local clock at detection time.
        local: VectorClock,
        /// The conflicting update's clock.
        remote: VectorClock,
    },
    /// An agent came to life.
    AgentSpawned {
        /// Configured lifetime in seconds.
        lifetime_secs: u64,
    },
    /// An agent's lifetime ran out.
    AgentExpired,
    /// An agent released its resources.
    AgentDestroyed,
}

/// A federation event with its origin and time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederationEvent {
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// The agent the event concerns, when known.
    pub agent_id: Option<String>,
    /// The tenant the event concerns, when known.
    pub tenant_id: Option<String>,
    /// What happened.
    pub kind: FederationEventKind,
}

impl FederationEvent {
    /// Create an event with no agent or tenant attribution.
    pub fn new(kind: FederationEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            agent_id: None,
            tenant_id: None,
            kind,
        }
    }

    /// Create an event attributed to an agent within a tenant.
    pub fn for_agent(
        agent_id: impl Into<String>,
        tenant_id: impl Into<String>,
        kind: FederationEventKind,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            agent_id: Some(agent_id.into()),
            tenant_id: Some(tenant_id.into()),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_attribution() {
        let event = FederationEvent::for_agent("a1", "t1", FederationEventKind::Connected);
        assert_eq!(event.agent_id.as_deref(), Some("a1"));
        assert_eq!(event.tenant_id.as_deref(), Some("t1"));

        let bare = FederationEvent::new(FederationEventKind::Disconnected);
        assert!(bare.agent_id.is_none());
    }

    #[test]
    fn test_kind_serializes_with_event_tag() {
        let kind = FederationEventKind::SyncCompleted {
            duration_ms: 12,
            pulled: 3,
            pushed: 1,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["event"], "sync_completed");
        assert_eq!(json["pulled"], 3);
    }

    #[test]
    fn test_conflict_event_carries_both_clocks() {
        let local = VectorClock::new().increment("a1");
        let remote = VectorClock::new().increment("a2");
        let event = FederationEvent::for_agent(
            "a1",
            "t1",
            FederationEventKind::ConflictDetected {
                local: local.clone(),
                remote: remote.clone(),
            },
        );
        match event.kind {
            FederationEventKind::ConflictDetected {
                local: l,
                remote: r,
            } => {
                assert_eq!(l, local);
                assert_eq!(r, remote);
            }
            _ => panic!("wrong kind"),
        }
    }
}
