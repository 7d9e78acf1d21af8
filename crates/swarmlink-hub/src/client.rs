//! The agent-side hub client: session lifecycle and the sync cycle.

use crate::error::{HubError, HubResult};
use crate::message::SyncMessage;
use crate::transport::HubTransport;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use swarmlink_memory::EpisodeStore;
use swarmlink_types::{
    ClockManager, FederationEvent, FederationEventKind, SyncOperation, SyncStats, SyncUpdate,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the client's event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// What one sync cycle accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Updates received from the hub and applied locally.
    pub pulled: usize,
    /// Pending episodes pushed to the hub.
    pub pushed: usize,
    /// Pulled updates that were concurrent with local state.
    pub conflicts: usize,
}

/// One agent's connection to the sync hub.
///
/// A sync cycle ticks the agent's clock, pulls and applies the tenant's
/// update log, then pushes everything pending in the local store. Cycles
/// never overlap; a second caller waits for the running cycle to finish.
pub struct HubClient {
    agent_id: String,
    tenant_id: String,
    token: String,
    transport: Arc<dyn HubTransport>,
    connected: AtomicBool,
    clock: Mutex<ClockManager>,
    sync_guard: tokio::sync::Mutex<()>,
    last_sync_at: Mutex<Option<DateTime<Utc>>>,
    syncs_completed: AtomicU64,
    syncs_failed: AtomicU64,
    updates_pulled: AtomicU64,
    updates_pushed: AtomicU64,
    events: broadcast::Sender<FederationEvent>,
}

impl HubClient {
    /// Create a client for one agent. No traffic happens until
    /// [`HubClient::connect`].
    pub fn new(
        agent_id: impl Into<String>,
        tenant_id: impl Into<String>,
        token: impl Into<String>,
        transport: Arc<dyn HubTransport>,
    ) -> Self {
        let agent_id = agent_id.into();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            clock: Mutex::new(ClockManager::new(agent_id.as_str())),
            agent_id,
            tenant_id: tenant_id.into(),
            token: token.into(),
            transport,
            connected: AtomicBool::new(false),
            sync_guard: tokio::sync::Mutex::new(()),
            last_sync_at: Mutex::new(None),
            syncs_completed: AtomicU64::new(0),
            syncs_failed: AtomicU64::new(0),
            updates_pulled: AtomicU64::new(0),
            updates_pushed: AtomicU64::new(0),
            events,
        }
    }

    /// Authenticate with the hub. Idempotent while connected.
    pub async fn connect(&self) -> HubResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let clock = self.vector_clock();
        let reply = self
            .transport
            .send(SyncMessage::auth(
                self.agent_id.as_str(),
                self.tenant_id.as_str(),
                self.token.as_str(),
                clock,
            ))
            .await?;

        match reply {
            SyncMessage::Ack { vector_clock, .. } => {
                if let Some(remote) = vector_clock {
                    let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
                    clock.merge(&remote);
                }
                self.connected.store(true, Ordering::SeqCst);
                info!(
                    agent_id = %self.agent_id,
                    tenant_id = %self.tenant_id,
                    "Connected to sync hub"
                );
                self.emit(FederationEventKind::Connected);
                Ok(())
            }
            SyncMessage::Error { error, .. } => Err(HubError::AuthRejected(error)),
            other => Err(HubError::Protocol(format!(
                "unexpected {} reply to auth",
                other.message_type()
            ))),
        }
    }

    /// Run one sync cycle against `store`.
    ///
    /// Pull first so pushed updates build on everything the tenant already
    /// knows. Failures leave the pending queue intact; those episodes ride
    /// the next cycle.
    pub async fn sync(&self, store: &EpisodeStore) -> HubResult<SyncOutcome> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(HubError::NotConnected);
        }
        let _guard = self.sync_guard.lock().await;

        let started = Instant::now();
        self.emit(FederationEventKind::SyncStarted);

        match self.sync_cycle(store).await {
            Ok(outcome) => {
                self.syncs_completed.fetch_add(1, Ordering::SeqCst);
                self.updates_pulled
                    .fetch_add(outcome.pulled as u64, Ordering::SeqCst);
                self.updates_pushed
                    .fetch_add(outcome.pushed as u64, Ordering::SeqCst);
                {
                    let mut last = self.last_sync_at.lock().unwrap_or_else(|e| e.into_inner());
                    *last = Some(Utc::now());
                }
                let duration_ms = started.elapsed().as_millis() as u64;
                debug!(
                    agent_id = %self.agent_id,
                    pulled = outcome.pulled,
                    pushed = outcome.pushed,
                    duration_ms,
                    "Sync cycle completed"
                );
                self.emit(FederationEventKind::SyncCompleted {
                    duration_ms,
                    pulled: outcome.pulled,
                    pushed: outcome.pushed,
                });
                Ok(outcome)
            }
            Err(e) => {
                self.syncs_failed.fetch_add(1, Ordering::SeqCst);
                warn!(agent_id = %self.agent_id, error = %e, "Sync cycle failed");
                self.emit(FederationEventKind::SyncFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn sync_cycle(&self, store: &EpisodeStore) -> HubResult<SyncOutcome> {
        // The cycle itself is a local event.
        let clock = {
            let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
            clock.tick()
        };

        let reply = self
            .transport
            .send(SyncMessage::pull(self.agent_id.as_str(), clock))
            .await?;
        let (remote_updates, hub_clock) = match reply {
            SyncMessage::Ack {
                data, vector_clock, ..
            } => (data.unwrap_or_default(), vector_clock),
            SyncMessage::Error { error, .. } => return Err(HubError::Protocol(error)),
            other => {
                return Err(HubError::Protocol(format!(
                    "unexpected {} reply to pull",
                    other.message_type()
                )))
            }
        };

        let pulled = remote_updates.len();
        let mut conflicts = 0;
        for update in &remote_updates {
            let conflict = {
                let clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
                clock.detect_conflict(&update.vector_clock)
            };
            if conflict {
                conflicts += 1;
                debug!(
                    update_id = %update.id,
                    "Concurrent update, resolving last-write-wins"
                );
                self.emit(FederationEventKind::ConflictDetected {
                    local: self.vector_clock(),
                    remote: update.vector_clock.clone(),
                });
            }
            store.apply_update(update)?;
            let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
            clock.merge(&update.vector_clock);
        }
        if let Some(remote) = hub_clock {
            let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
            clock.merge(&remote);
        }

        let pending = store.pending_episodes(&self.tenant_id)?;
        let pushed = pending.len();
        if !pending.is_empty() {
            let current = self.vector_clock();
            let ids: Vec<String> = pending.iter().map(|episode| episode.id.clone()).collect();
            let mut updates = Vec::with_capacity(pending.len());
            for episode in &pending {
                updates.push(SyncUpdate::new(
                    SyncOperation::Insert,
                    "episodes",
                    serde_json::to_value(episode)?,
                    current.clone(),
                    self.tenant_id.as_str(),
                ));
            }

            let reply = self
                .transport
                .send(SyncMessage::push(self.agent_id.as_str(), updates, current))
                .await?;
            match reply {
                SyncMessage::Ack { vector_clock, .. } => {
                    if let Some(remote) = vector_clock {
                        let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
                        clock.merge(&remote);
                    }
                    store.mark_synced(&ids)?;
                }
                SyncMessage::Error { error, .. } => return Err(HubError::Protocol(error)),
                other => {
                    return Err(HubError::Protocol(format!(
                        "unexpected {} reply to push",
                        other.message_type()
                    )))
                }
            }
        }

        Ok(SyncOutcome {
            pulled,
            pushed,
            conflicts,
        })
    }

    /// Close the session. Idempotent; waits out an in-flight sync cycle
    /// before disconnecting.
    pub async fn disconnect(&self) {
        let _guard = self.sync_guard.lock().await;
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        self.transport.close(&self.agent_id).await;
        info!(agent_id = %self.agent_id, "Disconnected from sync hub");
        self.emit(FederationEventKind::Disconnected);
    }

    /// Whether a hub session is currently established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Snapshot of the agent's clock.
    pub fn vector_clock(&self) -> swarmlink_types::VectorClock {
        let clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        clock.current()
    }

    /// Point-in-time snapshot of this client's sync activity.
    pub fn sync_stats(&self) -> SyncStats {
        let last_sync_at = {
            let last = self.last_sync_at.lock().unwrap_or_else(|e| e.into_inner());
            *last
        };
        SyncStats {
            agent_id: self.agent_id.clone(),
            tenant_id: self.tenant_id.clone(),
            connected: self.is_connected(),
            last_sync_at,
            syncs_completed: self.syncs_completed.load(Ordering::SeqCst),
            syncs_failed: self.syncs_failed.load(Ordering::SeqCst),
            updates_pulled: self.updates_pulled.load(Ordering::SeqCst),
            updates_pushed: self.updates_pushed.load(Ordering::SeqCst),
            vector_clock: self.vector_clock(),
        }
    }

    /// The agent this client syncs for.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The tenant this client syncs under.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Subscribe to this client's sync events.
    pub fn subscribe(&self) -> broadcast::Receiver<FederationEvent> {
        self.events.subscribe()
    }

    fn emit(&self, kind: FederationEventKind) {
        // Delivery is best-effort; a client with no subscribers is fine.
        let _ = self.events.send(FederationEvent::for_agent(
            self.agent_id.as_str(),
            self.tenant_id.as_str(),
            kind,
        ));
    }
}
