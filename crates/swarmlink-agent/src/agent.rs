//! Ephemeral agents: spawn, work against tenant memory, sync, die.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use swarmlink_hub::HubClient;
use swarmlink_memory::EpisodeStore;
use swarmlink_security::{AgentTokenPayload, SecurityManager};
use swarmlink_types::{
    EpisodeDraft, FederationEvent, FederationEventKind, LearningEpisode, SyncStats,
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::events::EventLog;

/// Episodes returned by [`EphemeralAgent::query_memories`] unless the
/// caller asks for more.
pub const DEFAULT_RECALL_LIMIT: usize = 5;

/// Identity and lifetime of a live agent.
///
/// Handed to every task an agent executes, and cleared on destroy.
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// The agent's unique id, embedding its tenant.
    pub agent_id: String,
    /// Tenant the agent works for.
    pub tenant_id: String,
    /// Auth token bound to the agent's lifetime.
    pub token: String,
    /// When the agent came to life.
    pub spawned_at: DateTime<Utc>,
    /// When the agent stops accepting work.
    pub expires_at: DateTime<Utc>,
}

/// A short-lived worker with its own episode store and, optionally, a
/// hub session that federates that store across the tenant.
///
/// Agents are created through [`EphemeralAgent::spawn`] and die either
/// when their lifetime runs out or when [`EphemeralAgent::destroy`] is
/// called. Every task executed between those points is bracketed by
/// sync cycles so it reads the tenant's latest knowledge and publishes
/// its own before finishing.
pub struct EphemeralAgent {
    agent_id: String,
    tenant_id: String,
    expires_at: DateTime<Utc>,
    store: EpisodeStore,
    hub: Option<Arc<HubClient>>,
    security: Arc<SecurityManager>,
    context: Mutex<Option<AgentContext>>,
    destroyed: AtomicBool,
    expired: AtomicBool,
    shutdown: watch::Sender<bool>,
    events: EventLog,
}

impl EphemeralAgent {
    /// Bring a new agent to life.
    ///
    /// The agent gets a fresh identity, a token expiring with its
    /// lifetime, and its own episode store. When a hub is configured
    /// the agent connects before this returns and keeps syncing in the
    /// background; a rejected connection tears the agent down and
    /// surfaces the error. Spawning is the only way to obtain an agent.
    pub async fn spawn(config: AgentConfig) -> AgentResult<Arc<Self>> {
        let spawned_at = Utc::now();
        let expires_at = spawned_at + chrono::Duration::seconds(config.lifetime_secs as i64);
        let agent_id = generate_agent_id(&config.tenant_id);

        // Hub-less agents still mint a token so tasks always see one;
        // it just never leaves the process.
        let security = match &config.hub {
            Some(handle) => handle.security.clone(),
            None => Arc::new(SecurityManager::new(generate_local_secret())),
        };
        let token = security.create_token(&AgentTokenPayload::new(
            agent_id.as_str(),
            config.tenant_id.as_str(),
            expires_at.timestamp_millis(),
        ));

        let store = match &config.memory_path {
            Some(path) => EpisodeStore::open(path)?,
            None => EpisodeStore::open_in_memory()?,
        };

        let hub = config.hub.as_ref().map(|handle| {
            Arc::new(HubClient::new(
                agent_id.as_str(),
                config.tenant_id.as_str(),
                token.as_str(),
                handle.transport.clone(),
            ))
        });

        let context = AgentContext {
            agent_id: agent_id.clone(),
            tenant_id: config.tenant_id.clone(),
            token,
            spawned_at,
            expires_at,
        };

        let (shutdown, _) = watch::channel(false);
        let agent = Arc::new(Self {
            agent_id,
            tenant_id: config.tenant_id.clone(),
            expires_at,
            store,
            hub,
            security,
            context: Mutex::new(Some(context)),
            destroyed: AtomicBool::new(false),
            expired: AtomicBool::new(false),
            shutdown,
            events: EventLog::new(),
        });

        agent.events.emit(FederationEvent::for_agent(
            agent.agent_id.as_str(),
            agent.tenant_id.as_str(),
            FederationEventKind::AgentSpawned {
                lifetime_secs: config.lifetime_secs,
            },
        ));

        spawn_expiry_timer(&agent, Duration::from_secs(config.lifetime_secs));
        if let Some(client) = &agent.hub {
            // Forward before connecting so the Connected event lands in
            // the agent's log.
            spawn_event_forwarder(&agent, client.subscribe());
            spawn_sync_loop(&agent, Duration::from_millis(config.sync_interval_ms));
            if let Err(err) = client.connect().await {
                agent.destroy().await;
                return Err(err.into());
            }
        }

        info!(
            agent_id = %agent.agent_id,
            tenant_id = %agent.tenant_id,
            lifetime_secs = config.lifetime_secs,
            "Agent spawned"
        );
        Ok(agent)
    }

    /// Run a task with the agent's store and context.
    ///
    /// The task is bracketed by sync cycles: a pull-first cycle before
    /// it runs so it sees what the tenant already knows, and another
    /// after so its episodes reach the hub. Sync failures surface as
    /// errors rather than letting the task run on silently stale data.
    ///
    /// Fails with [`AgentError::Expired`] once the lifetime has run out
    /// and [`AgentError::NotInitialized`] after a destroy.
    pub async fn execute<T, F, Fut>(&self, task: F) -> AgentResult<T>
    where
        F: FnOnce(EpisodeStore, AgentContext) -> Fut,
        Fut: Future<Output = AgentResult<T>>,
    {
        if self.expired.load(Ordering::SeqCst) || Utc::now() >= self.expires_at {
            return Err(AgentError::Expired);
        }
        let context = self.info().ok_or(AgentError::NotInitialized)?;

        if let Some(client) = &self.hub {
            client.sync(&self.store).await?;
        }
        let result = task(self.store.clone(), context).await?;
        if let Some(client) = &self.hub {
            client.sync(&self.store).await?;
        }
        Ok(result)
    }

    /// Record a learning episode under the agent's tenant.
    ///
    /// Success is derived from the reward; the episode stays pending
    /// until a sync cycle pushes it to the hub.
    pub fn store_episode(&self, draft: EpisodeDraft) -> AgentResult<LearningEpisode> {
        let episode = LearningEpisode::from_draft(draft, self.tenant_id.as_str());
        self.store.insert_episode(&episode)?;
        debug!(
            agent_id = %self.agent_id,
            episode_id = %episode.id,
            reward = episode.reward,
            "Stored learning episode"
        );
        Ok(episode)
    }

    /// The most relevant episodes for `query`, best rewards first.
    pub fn query_memories(&self, query: &str) -> AgentResult<Vec<LearningEpisode>> {
        self.query_memories_limit(query, DEFAULT_RECALL_LIMIT)
    }

    /// Like [`EphemeralAgent::query_memories`] with a caller-chosen limit.
    pub fn query_memories_limit(
        &self,
        query: &str,
        limit: usize,
    ) -> AgentResult<Vec<LearningEpisode>> {
        Ok(self.store.recall(&self.tenant_id, query, limit)?)
    }

    /// Tear the agent down. Idempotent, and always completes.
    ///
    /// Pending episodes get one best-effort final sync, the hub session
    /// closes, background tasks stop, and the store shuts. Sync or
    /// transport failures are logged and swallowed so teardown cannot
    /// wedge on a dead hub.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(client) = &self.hub {
            if client.is_connected() {
                if let Err(err) = client.sync(&self.store).await {
                    warn!(
                        agent_id = %self.agent_id,
                        error = %err,
                        "Final sync failed during destroy"
                    );
                }
                client.disconnect().await;
            }
        }

        let _ = self.shutdown.send(true);
        self.store.close();
        {
            let mut context = self.context.lock().unwrap_or_else(|e| e.into_inner());
            *context = None;
        }

        info!(agent_id = %self.agent_id, tenant_id = %self.tenant_id, "Agent destroyed");
        self.events.emit(FederationEvent::for_agent(
            self.agent_id.as_str(),
            self.tenant_id.as_str(),
            FederationEventKind::AgentDestroyed,
        ));
    }

    /// Whole seconds left before expiry. Zero once expired or destroyed.
    pub fn remaining_lifetime_secs(&self) -> u64 {
        if self.destroyed.load(Ordering::SeqCst) {
            return 0;
        }
        (self.expires_at - Utc::now()).num_seconds().max(0) as u64
    }

    /// True while the agent holds its context and its lifetime has not
    /// run out.
    pub fn is_alive(&self) -> bool {
        let has_context = self
            .context
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some();
        has_context && Utc::now() < self.expires_at
    }

    /// The agent's context, or `None` after destroy.
    pub fn info(&self) -> Option<AgentContext> {
        self.context.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The agent's unique id.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The tenant the agent works for.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// When the agent stops accepting work.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// The agent's episode store.
    pub fn store(&self) -> &EpisodeStore {
        &self.store
    }

    /// The security manager that minted the agent's token.
    pub fn security(&self) -> Arc<SecurityManager> {
        self.security.clone()
    }

    /// Sync counters, when the agent has a hub.
    pub fn sync_stats(&self) -> Option<SyncStats> {
        self.hub.as_ref().map(|client| client.sync_stats())
    }

    /// Subscribe to the agent's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<FederationEvent> {
        self.events.subscribe()
    }

    /// The most recent events, newest first.
    pub fn event_history(&self, limit: usize) -> Vec<FederationEvent> {
        self.events.history(limit)
    }
}

/// Destroys the agent when its lifetime runs out.
fn spawn_expiry_timer(agent: &Arc<EphemeralAgent>, lifetime: Duration) {
    let weak = Arc::downgrade(agent);
    let mut shutdown = agent.shutdown.subscribe();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(lifetime) => {}
            _ = shutdown.changed() => return,
        }
        let Some(agent) = weak.upgrade() else {
            return;
        };
        agent.expired.store(true, Ordering::SeqCst);
        info!(agent_id = %agent.agent_id, "Agent lifetime expired");
        agent.events.emit(FederationEvent::for_agent(
            agent.agent_id.as_str(),
            agent.tenant_id.as_str(),
            FederationEventKind::AgentExpired,
        ));
        agent.destroy().await;
    });
}

/// Runs periodic sync cycles until shutdown.
fn spawn_sync_loop(agent: &Arc<EphemeralAgent>, interval: Duration) {
    let weak = Arc::downgrade(agent);
    let mut shutdown = agent.shutdown.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => return,
            }
            let Some(agent) = weak.upgrade() else {
                return;
            };
            if agent.destroyed.load(Ordering::SeqCst) {
                return;
            }
            if let Some(client) = &agent.hub {
                if let Err(err) = client.sync(&agent.store).await {
                    warn!(agent_id = %agent.agent_id, error = %err, "Periodic sync failed");
                }
            }
        }
    });
}

/// Mirrors hub client events into the agent's own log.
fn spawn_event_forwarder(
    agent: &Arc<EphemeralAgent>,
    mut rx: broadcast::Receiver<FederationEvent>,
) {
    let weak = Arc::downgrade(agent);
    let mut shutdown = agent.shutdown.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                result = rx.recv() => match result {
                    Ok(event) => {
                        let Some(agent) = weak.upgrade() else {
                            return;
                        };
                        agent.events.emit(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = shutdown.changed() => {
                    // Drain what the client emitted just before teardown.
                    while let Ok(event) = rx.try_recv() {
                        if let Some(agent) = weak.upgrade() {
                            agent.events.emit(event);
                        }
                    }
                    return;
                }
            }
        }
    });
}

fn generate_agent_id(tenant_id: &str) -> String {
    let suffix: u16 = rand::random();
    format!(
        "{}-{}-{:04x}",
        tenant_id,
        Utc::now().timestamp_millis(),
        suffix
    )
}

fn generate_local_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
