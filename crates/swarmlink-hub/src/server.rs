//! The sync hub: auth, pull, push, and per-tenant fan-out.
//!
//! The hub keeps one append-only update log per tenant plus a global
//! vector clock ticked on every push. It never inspects update payloads
//! beyond the tenant id; payload crypto stays between agents.

use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::message::SyncMessage;
use crate::registry::ConnectionRegistry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use swarmlink_memory::EpisodeStore;
use swarmlink_security::SecurityManager;
use swarmlink_types::{
    AgentConnection, ClockManager, FederationEvent, FederationEventKind, HubStats, SyncUpdate,
    VectorClock,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Node id the hub ticks its own clock under.
const HUB_NODE_ID: &str = "hub";

/// Capacity of the hub's event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// The federation sync hub.
///
/// One instance serves many tenants; every operation is scoped to the
/// authenticated session's tenant. Wrap in an [`Arc`] to share with
/// transports.
pub struct HubServer {
    config: HubConfig,
    security: Arc<SecurityManager>,
    registry: ConnectionRegistry,
    tenant_log: RwLock<HashMap<String, Vec<SyncUpdate>>>,
    clock: Mutex<ClockManager>,
    store: Option<EpisodeStore>,
    started: AtomicBool,
    started_at: Mutex<Option<Instant>>,
    events: broadcast::Sender<FederationEvent>,
}

impl HubServer {
    /// Create a hub from configuration.
    ///
    /// Generates a random signing secret when the config leaves it unset;
    /// token issuers must then share this hub's [`HubServer::security`]
    /// handle. Fails only when a configured `db_path` cannot be opened.
    pub fn new(config: HubConfig) -> HubResult<Self> {
        let secret = config.secret.clone().unwrap_or_else(generate_secret);
        let security = Arc::new(SecurityManager::new(secret));
        let store = match &config.db_path {
            Some(path) => Some(EpisodeStore::open(path)?),
            None => None,
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            security,
            registry: ConnectionRegistry::new(),
            tenant_log: RwLock::new(HashMap::new()),
            clock: Mutex::new(ClockManager::new(HUB_NODE_ID)),
            store,
            started: AtomicBool::new(false),
            started_at: Mutex::new(None),
            events,
        })
    }

    /// Start serving. Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut started_at = self.started_at.lock().unwrap_or_else(|e| e.into_inner());
        *started_at = Some(Instant::now());
        info!(
            port = self.config.port,
            max_agents = self.config.max_agents,
            "Sync hub started"
        );
    }

    /// Stop serving and disconnect every agent. Idempotent.
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        for connection in self.registry.all() {
            self.disconnect_agent(&connection.agent_id);
        }
        info!("Sync hub stopped");
    }

    /// Whether the hub is currently accepting sessions.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Handle one inbound message and produce the reply.
    ///
    /// Never fails: every error becomes an `error` reply so the transport
    /// has something to deliver.
    pub async fn handle_message(&self, msg: SyncMessage) -> SyncMessage {
        match msg {
            SyncMessage::Auth {
                agent_id,
                tenant_id,
                token,
                vector_clock,
                ..
            } => {
                if self.handle_auth(&agent_id, &tenant_id, &token, &vector_clock) {
                    SyncMessage::ack(Some(agent_id), None, Some(self.global_vector_clock()))
                } else {
                    SyncMessage::error("authentication failed")
                }
            }
            SyncMessage::Pull {
                agent_id,
                vector_clock,
                ..
            } => match self.handle_pull(&agent_id, &vector_clock) {
                Ok((updates, clock)) => SyncMessage::ack(Some(agent_id), Some(updates), Some(clock)),
                Err(e) => SyncMessage::error(e.to_string()),
            },
            SyncMessage::Push {
                agent_id,
                data,
                vector_clock,
                ..
            } => match self.handle_push(&agent_id, &data, &vector_clock) {
                Ok(clock) => SyncMessage::ack(Some(agent_id), None, Some(clock)),
                Err(e) => SyncMessage::error(e.to_string()),
            },
            other => SyncMessage::error(format!(
                "unexpected {} message from agent",
                other.message_type()
            )),
        }
    }

    /// Authenticate an agent and open its session.
    ///
    /// Returns `false` on any failure: hub not started, missing fields,
    /// bad or expired token, token identity mismatch, or hub at capacity.
    /// Re-auth of an already connected agent replaces its session and is
    /// exempt from the capacity check.
    pub fn handle_auth(
        &self,
        agent_id: &str,
        tenant_id: &str,
        token: &str,
        vector_clock: &VectorClock,
    ) -> bool {
        if !self.started.load(Ordering::SeqCst) {
            warn!(agent_id, "Rejected auth: hub is not started");
            return false;
        }
        if agent_id.is_empty() || tenant_id.is_empty() || token.is_empty() {
            warn!(agent_id, tenant_id, "Rejected auth: missing credentials");
            return false;
        }

        let payload = match self.security.verify_token(token) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(agent_id, error = %e, "Rejected auth: token verification failed");
                return false;
            }
        };
        if payload.agent_id != agent_id || payload.tenant_id != tenant_id {
            warn!(
                agent_id,
                tenant_id,
                token_agent = %payload.agent_id,
                token_tenant = %payload.tenant_id,
                "Rejected auth: token identity mismatch"
            );
            return false;
        }

        if !self.registry.contains(agent_id) && self.registry.count() >= self.config.max_agents {
            warn!(
                agent_id,
                max = self.config.max_agents,
                "Rejected auth: hub at capacity"
            );
            return false;
        }

        self.registry
            .register(AgentConnection::new(agent_id, tenant_id, vector_clock.clone()));
        info!(agent_id, tenant_id, "Agent authenticated");
        self.emit(FederationEvent::for_agent(
            agent_id,
            tenant_id,
            FederationEventKind::Connected,
        ));
        true
    }

    /// Serve a pull: the tenant's full update log plus the hub's clock.
    ///
    /// The full log keeps the hub stateless about per-agent read positions;
    /// receivers drop updates they already applied via the clock merge.
    pub fn handle_pull(
        &self,
        agent_id: &str,
        vector_clock: &VectorClock,
    ) -> HubResult<(Vec<SyncUpdate>, VectorClock)> {
        let connection = self
            .registry
            .get(agent_id)
            .ok_or_else(|| HubError::UnknownAgent(agent_id.to_string()))?;

        let updates = {
            let log = self.tenant_log.read().unwrap_or_else(|e| e.into_inner());
            log.get(&connection.tenant_id).cloned().unwrap_or_default()
        };
        self.registry.record_sync(agent_id, vector_clock);

        let global = self.global_vector_clock();
        debug!(agent_id, updates = updates.len(), "Served pull");
        Ok((updates, global))
    }

    /// Accept a push: validate tenants, append to the log, advance the
    /// global clock, and fan out to the tenant's other agents.
    ///
    /// A single update naming a foreign tenant rejects the whole batch
    /// and nothing is stored.
    pub fn handle_push(
        &self,
        agent_id: &str,
        updates: &[SyncUpdate],
        vector_clock: &VectorClock,
    ) -> HubResult<VectorClock> {
        let connection = self
            .registry
            .get(agent_id)
            .ok_or_else(|| HubError::UnknownAgent(agent_id.to_string()))?;

        for update in updates {
            if !self
                .security
                .validate_tenant_access(&connection.tenant_id, &update.tenant_id)
            {
                warn!(
                    agent_id,
                    agent_tenant = %connection.tenant_id,
                    update_tenant = %update.tenant_id,
                    "Rejected push: tenant isolation violation"
                );
                return Err(HubError::TenantIsolationViolation {
                    agent_tenant: connection.tenant_id.clone(),
                    update_tenant: update.tenant_id.clone(),
                });
            }
        }

        if !updates.is_empty() {
            let mut log = self.tenant_log.write().unwrap_or_else(|e| e.into_inner());
            log.entry(connection.tenant_id.clone())
                .or_default()
                .extend(updates.iter().cloned());
        }
        if let Some(store) = &self.store {
            for update in updates {
                if let Err(e) = store.apply_update(update) {
                    warn!(update_id = %update.id, error = %e, "Failed to persist update");
                }
            }
        }

        let global = {
            let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
            clock.merge_and_tick(vector_clock)
        };
        self.registry.record_sync(agent_id, vector_clock);

        if !updates.is_empty() {
            let broadcast = SyncMessage::broadcast(
                connection.tenant_id.clone(),
                updates.to_vec(),
                global.clone(),
            );
            for peer in self.registry.tenant_agents(&connection.tenant_id) {
                if peer.agent_id != agent_id {
                    self.registry.queue_broadcast(&peer.agent_id, broadcast.clone());
                }
            }
        }

        debug!(agent_id, updates = updates.len(), "Accepted push");
        Ok(global)
    }

    /// Close an agent's session. No-op for unknown agents.
    pub fn disconnect_agent(&self, agent_id: &str) {
        if let Some(connection) = self.registry.remove(agent_id) {
            info!(agent_id, tenant_id = %connection.tenant_id, "Agent disconnected");
            self.emit(FederationEvent::for_agent(
                agent_id,
                connection.tenant_id,
                FederationEventKind::Disconnected,
            ));
        }
    }

    /// Point-in-time hub statistics.
    pub fn stats(&self) -> HubStats {
        let (total_episodes, mut tenants) = {
            let log = self.tenant_log.read().unwrap_or_else(|e| e.into_inner());
            let total = log.values().map(Vec::len).sum();
            let tenants: HashSet<String> = log.keys().cloned().collect();
            (total, tenants)
        };
        tenants.extend(self.registry.tenants());

        let uptime_seconds = {
            let started_at = self.started_at.lock().unwrap_or_else(|e| e.into_inner());
            started_at.map(|t| t.elapsed().as_secs()).unwrap_or(0)
        };

        HubStats {
            connected_agents: self.registry.count(),
            total_episodes,
            tenants: tenants.len(),
            uptime_seconds,
        }
    }

    /// Snapshots of every open session.
    pub fn connected_agents(&self) -> Vec<AgentConnection> {
        self.registry.all()
    }

    /// Snapshots of one tenant's open sessions.
    pub fn tenant_agents(&self, tenant_id: &str) -> Vec<AgentConnection> {
        self.registry.tenant_agents(tenant_id)
    }

    /// Copy of one tenant's update log.
    pub fn tenant_updates(&self, tenant_id: &str) -> Vec<SyncUpdate> {
        let log = self.tenant_log.read().unwrap_or_else(|e| e.into_inner());
        log.get(tenant_id).cloned().unwrap_or_default()
    }

    /// Take the broadcasts queued for one agent, oldest first.
    pub fn drain_broadcasts(&self, agent_id: &str) -> Vec<SyncMessage> {
        self.registry.drain_outbox(agent_id)
    }

    /// Snapshot of the hub's global clock.
    pub fn global_vector_clock(&self) -> VectorClock {
        let clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        clock.current()
    }

    /// The hub's security manager, for minting tokens against its secret.
    pub fn security(&self) -> Arc<SecurityManager> {
        Arc::clone(&self.security)
    }

    /// The configuration the hub was built from.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Subscribe to hub lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<FederationEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: FederationEvent) {
        // Delivery is best-effort; a hub with no subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn generate_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
