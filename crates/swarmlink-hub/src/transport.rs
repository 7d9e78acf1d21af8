//! Transport abstraction between hub clients and a hub.

use crate::error::HubResult;
use crate::message::{decode_message, encode_message, SyncMessage};
use crate::server::HubServer;
use async_trait::async_trait;
use std::sync::Arc;

/// Delivers sync messages to a hub and returns its replies.
///
/// A transport carries exactly one session's traffic; request/response
/// pairing is the transport's problem, not the protocol's.
#[async_trait]
pub trait HubTransport: Send + Sync + 'static {
    /// Deliver a message and wait for the hub's reply.
    async fn send(&self, msg: SyncMessage) -> HubResult<SyncMessage>;

    /// Tear down the session on the hub side. Best-effort; defaults to a
    /// no-op for transports without a close notion.
    async fn close(&self, _agent_id: &str) {}
}

/// Transport that calls a [`HubServer`] living in the same process.
///
/// Messages still round-trip through the wire codec, so anything this
/// transport delivers would also survive a socket.
pub struct InProcessTransport {
    server: Arc<HubServer>,
}

impl InProcessTransport {
    /// Create a transport bound to `server`.
    pub fn new(server: Arc<HubServer>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl HubTransport for InProcessTransport {
    async fn send(&self, msg: SyncMessage) -> HubResult<SyncMessage> {
        let bytes = encode_message(&msg)?;
        let msg = decode_message(&bytes[4..])?;

        let reply = self.server.handle_message(msg).await;

        let bytes = encode_message(&reply)?;
        Ok(decode_message(&bytes[4..])?)
    }

    async fn close(&self, agent_id: &str) {
        self.server.disconnect_agent(agent_id);
    }
}
