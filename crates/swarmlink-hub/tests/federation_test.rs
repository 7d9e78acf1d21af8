//! Integration tests for hub-mediated federation.
//!
//! These tests wire real [`HubClient`]s to a real [`HubServer`] through the
//! in-process transport, so every message crosses the wire codec exactly as
//! it would over a socket. Each agent gets its own episode store; the tests
//! verify that stores converge, tenants stay isolated, and conflicts are
//! detected and resolved.

use chrono::Utc;
use std::sync::Arc;
use swarmlink_hub::{
    HubClient, HubConfig, HubError, HubServer, InProcessTransport, SyncMessage,
};
use swarmlink_memory::EpisodeStore;
use swarmlink_security::AgentTokenPayload;
use swarmlink_types::{
    EpisodeDraft, FederationEventKind, LearningEpisode, SyncOperation, SyncUpdate, VectorClock,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_hub(max_agents: usize) -> Arc<HubServer> {
    let config = HubConfig {
        max_agents,
        secret: Some("federation-test-secret".to_string()),
        ..HubConfig::default()
    };
    let server = Arc::new(HubServer::new(config).expect("in-memory hub"));
    server.start();
    server
}

fn make_client(server: &Arc<HubServer>, agent_id: &str, tenant_id: &str) -> HubClient {
    let expires = Utc::now().timestamp_millis() + 60_000;
    let token = server
        .security()
        .create_token(&AgentTokenPayload::new(agent_id, tenant_id, expires));
    HubClient::new(
        agent_id,
        tenant_id,
        token,
        Arc::new(InProcessTransport::new(Arc::clone(server))),
    )
}

fn write_episode(store: &EpisodeStore, tenant: &str, task: &str) -> LearningEpisode {
    let episode = LearningEpisode::from_draft(EpisodeDraft::new(task, "in", "out", 0.9), tenant);
    store.insert_episode(&episode).expect("insert episode");
    episode
}

// ---------------------------------------------------------------------------
// Federation scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_two_agents_converge_through_the_hub() {
    let server = make_hub(10);
    let a1 = make_client(&server, "a1", "t1");
    let a2 = make_client(&server, "a2", "t1");
    let store1 = EpisodeStore::open_in_memory().unwrap();
    let store2 = EpisodeStore::open_in_memory().unwrap();

    a1.connect().await.unwrap();
    a2.connect().await.unwrap();

    write_episode(&store1, "t1", "discovered by a1");
    let outcome = a1.sync(&store1).await.unwrap();
    assert_eq!(outcome.pushed, 1);

    let outcome = a2.sync(&store2).await.unwrap();
    assert_eq!(outcome.pulled, 1);
    let recalled = store2.recall("t1", "discovered", 5).unwrap();
    assert_eq!(recalled.len(), 1);
    assert_eq!(recalled[0].task, "discovered by a1");

    // a2's clock now reflects a1, the hub, and its own cycle.
    let clock = a2.vector_clock();
    assert!(clock.get("a1") >= 1);
    assert!(clock.get("hub") >= 1);
    assert!(clock.get("a2") >= 1);
}

#[tokio::test]
async fn test_repeated_pulls_do_not_duplicate_episodes() {
    let server = make_hub(10);
    let a1 = make_client(&server, "a1", "t1");
    let a2 = make_client(&server, "a2", "t1");
    let store1 = EpisodeStore::open_in_memory().unwrap();
    let store2 = EpisodeStore::open_in_memory().unwrap();

    a1.connect().await.unwrap();
    a2.connect().await.unwrap();

    write_episode(&store1, "t1", "once");
    a1.sync(&store1).await.unwrap();

    // The hub serves the full tenant log on every pull; applying the same
    // update again must not duplicate the row.
    for _ in 0..3 {
        a2.sync(&store2).await.unwrap();
    }
    assert_eq!(store2.episode_count("t1").unwrap(), 1);
}

#[tokio::test]
async fn test_tenants_never_see_each_other() {
    let server = make_hub(10);
    let a1 = make_client(&server, "a1", "t1");
    let b1 = make_client(&server, "b1", "t2");
    let store_a = EpisodeStore::open_in_memory().unwrap();
    let store_b = EpisodeStore::open_in_memory().unwrap();

    a1.connect().await.unwrap();
    b1.connect().await.unwrap();

    write_episode(&store_a, "t1", "tenant one secret");
    a1.sync(&store_a).await.unwrap();

    let outcome = b1.sync(&store_b).await.unwrap();
    assert_eq!(outcome.pulled, 0);
    assert_eq!(store_b.episode_count("t2").unwrap(), 0);
    assert!(store_b.recall("t2", "secret", 5).unwrap().is_empty());
}

#[tokio::test]
async fn test_forged_cross_tenant_push_is_rejected() {
    let server = make_hub(10);
    let a1 = make_client(&server, "a1", "t1");
    a1.connect().await.unwrap();

    // Bypass the client and craft a push whose update names another tenant.
    let forged = SyncUpdate::new(
        SyncOperation::Insert,
        "episodes",
        serde_json::json!({"task": "smuggled"}),
        VectorClock::new().increment("a1"),
        "t2",
    );
    let reply = server
        .handle_message(SyncMessage::push(
            "a1",
            vec![forged],
            VectorClock::new().increment("a1"),
        ))
        .await;
    match reply {
        SyncMessage::Error { error, .. } => {
            assert!(error.contains("isolation"), "unexpected error: {error}");
        }
        other => panic!("Expected Error, got {other:?}"),
    }
    assert!(server.tenant_updates("t2").is_empty());
}

#[tokio::test]
async fn test_hub_capacity_turns_agents_away() {
    let server = make_hub(1);
    let a1 = make_client(&server, "a1", "t1");
    let a2 = make_client(&server, "a2", "t1");

    a1.connect().await.unwrap();
    let err = a2.connect().await.unwrap_err();
    assert!(matches!(err, HubError::AuthRejected(_)));

    let connected = server.connected_agents();
    assert_eq!(connected.len(), 1);
    assert_eq!(connected[0].agent_id, "a1");

    // Capacity frees up once the first agent leaves.
    a1.disconnect().await;
    a2.connect().await.unwrap();
    assert_eq!(server.connected_agents().len(), 1);
}

#[tokio::test]
async fn test_concurrent_writers_detect_conflicts_and_converge() {
    let server = make_hub(10);
    let a1 = make_client(&server, "a1", "t1");
    let a2 = make_client(&server, "a2", "t1");
    let store1 = EpisodeStore::open_in_memory().unwrap();
    let store2 = EpisodeStore::open_in_memory().unwrap();

    a1.connect().await.unwrap();
    a2.connect().await.unwrap();
    let mut events = a2.subscribe();

    // Both agents write before either syncs, so the writes are concurrent.
    write_episode(&store1, "t1", "from a1");
    write_episode(&store2, "t1", "from a2");

    a1.sync(&store1).await.unwrap();
    // a2's pull sees a1's update, whose clock is concurrent with a2's.
    let outcome = a2.sync(&store2).await.unwrap();
    assert_eq!(outcome.pulled, 1);
    assert_eq!(outcome.conflicts, 1);

    // a1 picks up a2's episode on its next cycle.
    a1.sync(&store1).await.unwrap();
    assert_eq!(store1.episode_count("t1").unwrap(), 2);
    assert_eq!(store2.episode_count("t1").unwrap(), 2);

    let mut saw_conflict = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event.kind, FederationEventKind::ConflictDetected { .. }) {
            saw_conflict = true;
        }
    }
    assert!(saw_conflict, "expected a conflict_detected event");
}

#[tokio::test]
async fn test_push_fans_out_to_tenant_peers() {
    let server = make_hub(10);
    let a1 = make_client(&server, "a1", "t1");
    let a2 = make_client(&server, "a2", "t1");
    let b1 = make_client(&server, "b1", "t2");
    let store1 = EpisodeStore::open_in_memory().unwrap();

    a1.connect().await.unwrap();
    a2.connect().await.unwrap();
    b1.connect().await.unwrap();

    write_episode(&store1, "t1", "fanned out");
    a1.sync(&store1).await.unwrap();

    let queued = server.drain_broadcasts("a2");
    assert_eq!(queued.len(), 1);
    match &queued[0] {
        SyncMessage::Broadcast { tenant_id, data, .. } => {
            assert_eq!(tenant_id, "t1");
            assert_eq!(data.len(), 1);
        }
        other => panic!("Expected Broadcast, got {other:?}"),
    }
    assert!(server.drain_broadcasts("b1").is_empty());
    assert!(server.drain_broadcasts("a1").is_empty());
}

#[tokio::test]
async fn test_stopped_hub_fails_syncs_and_reconnects() {
    let server = make_hub(10);
    let a1 = make_client(&server, "a1", "t1");
    let store = EpisodeStore::open_in_memory().unwrap();

    a1.connect().await.unwrap();
    server.stop();

    // The hub dropped the session, so the cycle fails and counts as such.
    assert!(a1.sync(&store).await.is_err());
    assert_eq!(a1.sync_stats().syncs_failed, 1);

    // Reconnection is refused until the hub starts again.
    let a2 = make_client(&server, "a2", "t1");
    assert!(a2.connect().await.is_err());

    server.start();
    a2.connect().await.unwrap();
    assert_eq!(server.connected_agents().len(), 1);
}

#[tokio::test]
async fn test_hub_stats_reflect_federation_activity() {
    let server = make_hub(10);
    let a1 = make_client(&server, "a1", "t1");
    let b1 = make_client(&server, "b1", "t2");
    let store_a = EpisodeStore::open_in_memory().unwrap();
    let store_b = EpisodeStore::open_in_memory().unwrap();

    a1.connect().await.unwrap();
    b1.connect().await.unwrap();

    write_episode(&store_a, "t1", "one");
    write_episode(&store_a, "t1", "two");
    write_episode(&store_b, "t2", "three");
    a1.sync(&store_a).await.unwrap();
    b1.sync(&store_b).await.unwrap();

    let stats = server.stats();
    assert_eq!(stats.connected_agents, 2);
    assert_eq!(stats.total_episodes, 3);
    assert_eq!(stats.tenants, 2);
}
