//! Sync protocol message types.
//!
//! Hub and agents exchange JSON messages tagged by a `type` field, with
//! camelCase payload fields. For stream transports each message is framed
//! with a 4-byte big-endian length header.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swarmlink_types::{SyncUpdate, VectorClock};

/// A sync protocol message.
///
/// `auth`, `pull`, and `push` flow from agent to hub; `ack`, `error`, and
/// `broadcast` flow from hub to agent. Every message carries the sender's
/// wall-clock timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Open a session: present a signed token along with the agent's clock.
    #[serde(rename_all = "camelCase")]
    Auth {
        agent_id: String,
        tenant_id: String,
        token: String,
        vector_clock: VectorClock,
        timestamp: DateTime<Utc>,
    },
    /// Request the tenant's update log.
    #[serde(rename_all = "camelCase")]
    Pull {
        agent_id: String,
        vector_clock: VectorClock,
        timestamp: DateTime<Utc>,
    },
    /// Submit locally produced updates.
    #[serde(rename_all = "camelCase")]
    Push {
        agent_id: String,
        data: Vec<SyncUpdate>,
        vector_clock: VectorClock,
        timestamp: DateTime<Utc>,
    },
    /// Positive reply. Which optional fields are present depends on the
    /// request being acknowledged.
    #[serde(rename_all = "camelCase")]
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Vec<SyncUpdate>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vector_clock: Option<VectorClock>,
        timestamp: DateTime<Utc>,
    },
    /// Negative reply.
    Error {
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// Updates pushed by another agent of the same tenant, forwarded by
    /// the hub.
    #[serde(rename_all = "camelCase")]
    Broadcast {
        tenant_id: String,
        data: Vec<SyncUpdate>,
        vector_clock: VectorClock,
        timestamp: DateTime<Utc>,
    },
}

impl SyncMessage {
    /// Build an `auth` message stamped at the current time.
    pub fn auth(
        agent_id: impl Into<String>,
        tenant_id: impl Into<String>,
        token: impl Into<String>,
        vector_clock: VectorClock,
    ) -> Self {
        Self::Auth {
            agent_id: agent_id.into(),
            tenant_id: tenant_id.into(),
            token: token.into(),
            vector_clock,
            timestamp: Utc::now(),
        }
    }

    /// Build a `pull` message stamped at the current time.
    pub fn pull(agent_id: impl Into<String>, vector_clock: VectorClock) -> Self {
        Self::Pull {
            agent_id: agent_id.into(),
            vector_clock,
            timestamp: Utc::now(),
        }
    }

    /// Build a `push` message stamped at the current time.
    pub fn push(
        agent_id: impl Into<String>,
        data: Vec<SyncUpdate>,
        vector_clock: VectorClock,
    ) -> Self {
        Self::Push {
            agent_id: agent_id.into(),
            data,
            vector_clock,
            timestamp: Utc::now(),
        }
    }

    /// Build an `ack` reply stamped at the current time.
    pub fn ack(
        agent_id: Option<String>,
        data: Option<Vec<SyncUpdate>>,
        vector_clock: Option<VectorClock>,
    ) -> Self {
        Self::Ack {
            agent_id,
            data,
            vector_clock,
            timestamp: Utc::now(),
        }
    }

    /// Build an `error` reply stamped at the current time.
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build a `broadcast` message stamped at the current time.
    pub fn broadcast(
        tenant_id: impl Into<String>,
        data: Vec<SyncUpdate>,
        vector_clock: VectorClock,
    ) -> Self {
        Self::Broadcast {
            tenant_id: tenant_id.into(),
            data,
            vector_clock,
            timestamp: Utc::now(),
        }
    }

    /// The message's wire tag, for logging.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Pull { .. } => "pull",
            Self::Push { .. } => "push",
            Self::Ack { .. } => "ack",
            Self::Error { .. } => "error",
            Self::Broadcast { .. } => "broadcast",
        }
    }
}

/// Encode a sync message to bytes (4-byte big-endian length + JSON).
pub fn encode_message(msg: &SyncMessage) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = json.len() as u32;
    let mut bytes = Vec::with_capacity(4 + json.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

/// Decode the length prefix from a 4-byte header.
pub fn decode_length(header: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*header)
}

/// Parse a JSON body into a sync message.
pub fn decode_message(body: &[u8]) -> Result<SyncMessage, serde_json::Error> {
    serde_json::from_slice(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmlink_types::SyncOperation;

    fn make_update(tenant: &str) -> SyncUpdate {
        SyncUpdate::new(
            SyncOperation::Insert,
            "episodes",
            serde_json::json!({"task": "demo"}),
            VectorClock::new().increment("a1"),
            tenant,
        )
    }

    #[test]
    fn test_auth_wire_shape() {
        let msg = SyncMessage::auth("a1", "t1", "tok", VectorClock::new().increment("a1"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "auth");
        assert_eq!(json["agentId"], "a1");
        assert_eq!(json["tenantId"], "t1");
        assert_eq!(json["vectorClock"], serde_json::json!({"a1": 1}));
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_ack_omits_absent_fields() {
        let msg = SyncMessage::ack(None, None, None);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ack");
        assert!(json.get("agentId").is_none());
        assert!(json.get("data").is_none());
        assert!(json.get("vectorClock").is_none());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let msg = SyncMessage::pull("a1", VectorClock::new());
        let bytes = encode_message(&msg).unwrap();
        // First 4 bytes are length
        let len = decode_length(&[bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(len as usize, bytes.len() - 4);

        let decoded = decode_message(&bytes[4..]).unwrap();
        match decoded {
            SyncMessage::Pull { agent_id, .. } => assert_eq!(agent_id, "a1"),
            other => panic!("Expected Pull, got {other:?}"),
        }
    }

    #[test]
    fn test_push_carries_updates() {
        let msg = SyncMessage::push(
            "a1",
            vec![make_update("t1"), make_update("t1")],
            VectorClock::new().increment("a1"),
        );
        let bytes = encode_message(&msg).unwrap();
        let decoded = decode_message(&bytes[4..]).unwrap();
        match decoded {
            SyncMessage::Push { data, .. } => {
                assert_eq!(data.len(), 2);
                assert_eq!(data[0].tenant_id, "t1");
            }
            other => panic!("Expected Push, got {other:?}"),
        }
    }

    #[test]
    fn test_error_message() {
        let msg = SyncMessage::error("authentication failed");
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: SyncMessage = serde_json::from_str(&json).unwrap();
        match decoded {
            SyncMessage::Error { error, .. } => assert_eq!(error, "authentication failed"),
            other => panic!("Expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_broadcast_wire_shape() {
        let msg = SyncMessage::broadcast("t1", vec![make_update("t1")], VectorClock::new());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "broadcast");
        assert_eq!(json["tenantId"], "t1");
        assert_eq!(json["data"].as_array().unwrap().len(), 1);
    }
}
