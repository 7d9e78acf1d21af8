//! The per-agent episode store and sync staging area.

use crate::error::{MemoryError, MemoryResult};
use crate::migration::run_migrations;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use swarmlink_types::{LearningEpisode, SyncOperation, SyncUpdate};
use tracing::debug;

/// SQLite-backed store for one agent's learning episodes.
///
/// Locally written episodes stay flagged as pending until the sync layer
/// marks them pushed; updates arriving from the hub are applied with
/// last-write-wins resolution by timestamp. Cloning shares the underlying
/// connection.
#[derive(Clone)]
pub struct EpisodeStore {
    conn: Arc<Mutex<Connection>>,
    closed: Arc<AtomicBool>,
}

impl EpisodeStore {
    /// Open an in-memory store. Contents vanish when the last clone drops.
    pub fn open_in_memory() -> MemoryResult<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self::wrap(conn))
    }

    /// Open (or create) a file-backed store at `path`.
    pub fn open(path: &Path) -> MemoryResult<Self> {
        let conn = Connection::open(path)?;
        run_migrations(&conn)?;
        Ok(Self::wrap(conn))
    }

    fn wrap(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn conn(&self) -> MemoryResult<MutexGuard<'_, Connection>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MemoryError::Closed);
        }
        Ok(self.conn.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Write a locally created episode. It queues for push until the sync
    /// layer calls [`EpisodeStore::mark_synced`].
    pub fn insert_episode(&self, episode: &LearningEpisode) -> MemoryResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO episodes (id, tenant_id, task, input, output, reward, critique, success, created_at, updated_at, synced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, 0)",
            rusqlite::params![
                episode.id,
                episode.tenant_id,
                episode.task,
                episode.input,
                episode.output,
                episode.reward,
                episode.critique,
                episode.success,
                episode.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch one episode by id, scoped to a tenant.
    pub fn get_episode(
        &self,
        tenant_id: &str,
        episode_id: &str,
    ) -> MemoryResult<Option<LearningEpisode>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, tenant_id, task, input, output, reward, critique, success, created_at
                 FROM episodes WHERE id = ?1 AND tenant_id = ?2",
                rusqlite::params![episode_id, tenant_id],
                row_to_episode,
            )
            .optional()?;
        Ok(row)
    }

    /// Text search over a tenant's episodes.
    ///
    /// Matches `query` against task, input, and output with LIKE; an empty
    /// query returns everything. Results order by reward, then recency,
    /// capped at `limit`.
    pub fn recall(
        &self,
        tenant_id: &str,
        query: &str,
        limit: usize,
    ) -> MemoryResult<Vec<LearningEpisode>> {
        let conn = self.conn()?;

        let mut sql = String::from(
            "SELECT id, tenant_id, task, input, output, reward, critique, success, created_at
             FROM episodes WHERE tenant_id = ?1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(tenant_id.to_string())];
        if !query.is_empty() {
            sql.push_str(" AND (task LIKE ?2 OR input LIKE ?2 OR output LIKE ?2)");
            params.push(Box::new(format!("%{query}%")));
        }
        sql.push_str(" ORDER BY reward DESC, created_at DESC");
        sql.push_str(&format!(" LIMIT {limit}"));

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), row_to_episode)?;

        let mut episodes = Vec::new();
        for row in rows {
            episodes.push(row?);
        }
        Ok(episodes)
    }

    /// Episodes written locally and not yet pushed, oldest first.
    pub fn pending_episodes(&self, tenant_id: &str) -> MemoryResult<Vec<LearningEpisode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, task, input, output, reward, critique, success, created_at
             FROM episodes WHERE tenant_id = ?1 AND synced = 0 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![tenant_id], row_to_episode)?;

        let mut episodes = Vec::new();
        for row in rows {
            episodes.push(row?);
        }
        Ok(episodes)
    }

    /// Flag episodes as pushed so they leave the pending queue.
    ///
    /// The batch is transactional: on failure no id is marked, so one
    /// acked push is never left half-flagged.
    pub fn mark_synced(&self, episode_ids: &[String]) -> MemoryResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for id in episode_ids {
            tx.execute(
                "UPDATE episodes SET synced = 1 WHERE id = ?1",
                rusqlite::params![id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Apply an update received from the hub.
    ///
    /// Returns `true` when the update changed the store. An insert/update
    /// for a row that exists locally only wins when its timestamp is newer
    /// than the stored one (last write wins); applied rows are flagged
    /// synced so they are never echoed back to the hub.
    pub fn apply_update(&self, update: &SyncUpdate) -> MemoryResult<bool> {
        if update.table != "episodes" {
            debug!(table = %update.table, "Ignoring update for unknown table");
            return Ok(false);
        }
        let conn = self.conn()?;

        match update.operation {
            SyncOperation::Insert | SyncOperation::Update => {
                let episode: LearningEpisode = serde_json::from_value(update.data.clone())?;
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT updated_at FROM episodes WHERE id = ?1 AND tenant_id = ?2",
                        rusqlite::params![episode.id, update.tenant_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                match existing {
                    Some(stored) => {
                        if update.timestamp <= parse_timestamp(&stored) {
                            return Ok(false);
                        }
                        conn.execute(
                            "UPDATE episodes SET task = ?1, input = ?2, output = ?3, reward = ?4,
                                 critique = ?5, success = ?6, updated_at = ?7, synced = 1
                             WHERE id = ?8 AND tenant_id = ?9",
                            rusqlite::params![
                                episode.task,
                                episode.input,
                                episode.output,
                                episode.reward,
                                episode.critique,
                                episode.success,
                                update.timestamp.to_rfc3339(),
                                episode.id,
                                update.tenant_id,
                            ],
                        )?;
                    }
                    None => {
                        conn.execute(
                            "INSERT INTO episodes (id, tenant_id, task, input, output, reward, critique, success, created_at, updated_at, synced)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)",
                            rusqlite::params![
                                episode.id,
                                update.tenant_id,
                                episode.task,
                                episode.input,
                                episode.output,
                                episode.reward,
                                episode.critique,
                                episode.success,
                                episode.created_at.to_rfc3339(),
                                update.timestamp.to_rfc3339(),
                            ],
                        )?;
                    }
                }
                Ok(true)
            }
            SyncOperation::Delete => {
                let target = update
                    .data
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&update.id);
                let deleted = conn.execute(
                    "DELETE FROM episodes WHERE id = ?1 AND tenant_id = ?2",
                    rusqlite::params![target, update.tenant_id],
                )?;
                Ok(deleted > 0)
            }
        }
    }

    /// Number of episodes stored for a tenant.
    pub fn episode_count(&self, tenant_id: &str) -> MemoryResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM episodes WHERE tenant_id = ?1",
            rusqlite::params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Close the store. Idempotent; every later operation fails with
    /// [`MemoryError::Closed`]. The connection itself is released when the
    /// last clone drops.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// True once [`EpisodeStore::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn row_to_episode(row: &rusqlite::Row<'_>) -> rusqlite::Result<LearningEpisode> {
    let created_at: String = row.get(8)?;
    Ok(LearningEpisode {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        task: row.get(2)?,
        input: row.get(3)?,
        output: row.get(4)?,
        reward: row.get(5)?,
        critique: row.get(6)?,
        success: row.get(7)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use swarmlink_types::{EpisodeDraft, VectorClock};

    fn setup() -> EpisodeStore {
        EpisodeStore::open_in_memory().unwrap()
    }

    fn make_episode(tenant: &str, task: &str, reward: f64) -> LearningEpisode {
        LearningEpisode::from_draft(EpisodeDraft::new(task, "in", "out", reward), tenant)
    }

    fn make_update(episode: &LearningEpisode) -> SyncUpdate {
        SyncUpdate::new(
            SyncOperation::Insert,
            "episodes",
            serde_json::to_value(episode).unwrap(),
            VectorClock::new(),
            episode.tenant_id.clone(),
        )
    }

    #[test]
    fn test_insert_and_recall() {
        let store = setup();
        store
            .insert_episode(&make_episode("t1", "summarize the report", 0.9))
            .unwrap();

        let results = store.recall("t1", "report", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].task.contains("report"));
    }

    #[test]
    fn test_recall_is_tenant_scoped() {
        let store = setup();
        store
            .insert_episode(&make_episode("t1", "shared task", 0.9))
            .unwrap();
        store
            .insert_episode(&make_episode("t2", "shared task", 0.9))
            .unwrap();

        let results = store.recall("t1", "shared", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tenant_id, "t1");
    }

    #[test]
    fn test_recall_orders_by_reward_and_respects_limit() {
        let store = setup();
        store.insert_episode(&make_episode("t1", "low", 0.2)).unwrap();
        store.insert_episode(&make_episode("t1", "high", 0.9)).unwrap();
        store.insert_episode(&make_episode("t1", "mid", 0.5)).unwrap();

        let results = store.recall("t1", "", 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].task, "high");
        assert_eq!(results[1].task, "mid");
    }

    #[test]
    fn test_pending_queue_and_mark_synced() {
        let store = setup();
        let episode = make_episode("t1", "task", 0.8);
        store.insert_episode(&episode).unwrap();

        let pending = store.pending_episodes("t1").unwrap();
        assert_eq!(pending.len(), 1);

        store.mark_synced(&[episode.id.clone()]).unwrap();
        assert!(store.pending_episodes("t1").unwrap().is_empty());
    }

    #[test]
    fn test_mark_synced_commits_the_whole_batch() {
        let store = setup();
        let first = make_episode("t1", "first", 0.8);
        let second = make_episode("t1", "second", 0.8);
        store.insert_episode(&first).unwrap();
        store.insert_episode(&second).unwrap();

        // One call covers the whole acked push, an unknown id included;
        // the batch lands as a unit and every known id leaves the queue.
        store
            .mark_synced(&[
                first.id.clone(),
                "no-such-episode".to_string(),
                second.id.clone(),
            ])
            .unwrap();
        assert!(store.pending_episodes("t1").unwrap().is_empty());
    }

    #[test]
    fn test_apply_update_inserts_without_queueing() {
        let store = setup();
        let episode = make_episode("t1", "remote task", 0.8);
        let applied = store.apply_update(&make_update(&episode)).unwrap();
        assert!(applied);

        // Remote rows never echo back through the pending queue.
        assert!(store.pending_episodes("t1").unwrap().is_empty());
        assert_eq!(store.episode_count("t1").unwrap(), 1);
    }

    #[test]
    fn test_apply_update_last_write_wins() {
        let store = setup();
        let mut episode = make_episode("t1", "original", 0.8);
        let first = make_update(&episode);
        store.apply_update(&first).unwrap();

        // An older concurrent write loses.
        episode.task = "stale".to_string();
        let mut stale = make_update(&episode);
        stale.timestamp = first.timestamp - Duration::seconds(10);
        assert!(!store.apply_update(&stale).unwrap());
        let kept = store.get_episode("t1", &episode.id).unwrap().unwrap();
        assert_eq!(kept.task, "original");

        // A newer write wins.
        episode.task = "fresh".to_string();
        let mut fresh = make_update(&episode);
        fresh.timestamp = first.timestamp + Duration::seconds(10);
        assert!(store.apply_update(&fresh).unwrap());
        let replaced = store.get_episode("t1", &episode.id).unwrap().unwrap();
        assert_eq!(replaced.task, "fresh");
    }

    #[test]
    fn test_apply_update_delete() {
        let store = setup();
        let episode = make_episode("t1", "to remove", 0.8);
        store.apply_update(&make_update(&episode)).unwrap();

        let delete = SyncUpdate::new(
            SyncOperation::Delete,
            "episodes",
            serde_json::json!({"id": episode.id}),
            VectorClock::new(),
            "t1",
        );
        assert!(store.apply_update(&delete).unwrap());
        assert_eq!(store.episode_count("t1").unwrap(), 0);

        // Deleting again is a no-op.
        assert!(!store.apply_update(&delete).unwrap());
    }

    #[test]
    fn test_apply_update_ignores_unknown_table() {
        let store = setup();
        let update = SyncUpdate::new(
            SyncOperation::Insert,
            "sessions",
            serde_json::json!({}),
            VectorClock::new(),
            "t1",
        );
        assert!(!store.apply_update(&update).unwrap());
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let store = setup();
        store.insert_episode(&make_episode("t1", "task", 0.8)).unwrap();

        store.close();
        store.close();
        assert!(store.is_closed());
        assert!(matches!(
            store.recall("t1", "", 10),
            Err(MemoryError::Closed)
        ));
    }

    #[test]
    fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodes.db");

        {
            let store = EpisodeStore::open(&path).unwrap();
            store
                .insert_episode(&make_episode("t1", "persistent", 0.9))
                .unwrap();
        }

        let reopened = EpisodeStore::open(&path).unwrap();
        let results = reopened.recall("t1", "persistent", 10).unwrap();
        assert_eq!(results.len(), 1);
    }
}
