//! SQLite-backed `StateStore`: Sync Log, Sync State, Local-Change flags and
//! the Repository Manifest. Lives outside the version store on purpose so
//! none of it is versioned or transferred by push/pull.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docsync_core::error::{Result, SyncError};
use docsync_core::traits::StateStore;
use docsync_core::types::{RepositoryManifest, SyncDirection, SyncLogEntry, SyncState, SyncStatus};
use rusqlite::{params, Connection, OptionalExtension};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_log (
    collection TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    chunk_ids TEXT NOT NULL,
    sync_direction TEXT NOT NULL,
    sync_action TEXT NOT NULL,
    synced_at INTEGER NOT NULL,
    PRIMARY KEY (collection, doc_id)
);

CREATE TABLE IF NOT EXISTS sync_state (
    collection TEXT PRIMARY KEY,
    last_sync_commit TEXT,
    last_sync_at INTEGER,
    document_count INTEGER NOT NULL,
    chunk_count INTEGER NOT NULL,
    embedding_model TEXT NOT NULL,
    sync_status TEXT NOT NULL,
    error_message TEXT
);

CREATE TABLE IF NOT EXISTS local_change_flags (
    collection TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    flagged INTEGER NOT NULL,
    PRIMARY KEY (collection, doc_id)
);

CREATE TABLE IF NOT EXISTS manifest (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    branch TEXT NOT NULL,
    commit_id TEXT,
    remote_url TEXT,
    initialized INTEGER NOT NULL
);
"#;

/// Side-band state persistence, backed by a small local SQLite database.
pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
}

unsafe impl Send for SqliteStateStore {}
unsafe impl Sync for SqliteStateStore {}

impl SqliteStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| SyncError::database(format!("failed to open state store: {e}")))?;
        Self::init(conn)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncError::database(format!("failed to open in-memory state store: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .map_err(|e| SyncError::database(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| SyncError::database(format!("failed to initialize state store schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock().map_err(|e| SyncError::database(e.to_string()))?;
        f(&conn)
    }

    fn direction_str(d: SyncDirection) -> &'static str {
        match d {
            SyncDirection::VsToXs => "vs_to_xs",
            SyncDirection::XsToVs => "xs_to_vs",
        }
    }

    fn direction_from_str(s: &str) -> SyncDirection {
        match s {
            "xs_to_vs" => SyncDirection::XsToVs,
            _ => SyncDirection::VsToXs,
        }
    }

    fn action_str(a: docsync_core::types::SyncAction) -> &'static str {
        use docsync_core::types::SyncAction::*;
        match a {
            Added => "added",
            Modified => "modified",
            Deleted => "deleted",
            Staged => "staged",
        }
    }

    fn action_from_str(s: &str) -> docsync_core::types::SyncAction {
        use docsync_core::types::SyncAction::*;
        match s {
            "modified" => Modified,
            "deleted" => Deleted,
            "staged" => Staged,
            _ => Added,
        }
    }

    fn status_str(s: SyncStatus) -> &'static str {
        match s {
            SyncStatus::Clean => "clean",
            SyncStatus::Pending => "pending",
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Error => "error",
        }
    }

    fn status_from_str(s: &str) -> SyncStatus {
        match s {
            "clean" => SyncStatus::Clean,
            "in_progress" => SyncStatus::InProgress,
            "error" => SyncStatus::Error,
            _ => SyncStatus::Pending,
        }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get_sync_log(&self, collection: &str, doc_id: &str) -> Result<Option<SyncLogEntry>> {
        let collection = collection.to_string();
        let doc_id = doc_id.to_string();
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT collection, doc_id, content_hash, chunk_ids, sync_direction, sync_action, synced_at \
                 FROM sync_log WHERE collection = ?1 AND doc_id = ?2",
                params![collection, doc_id],
                |row| {
                    let chunk_ids_json: String = row.get(3)?;
                    Ok(SyncLogEntry {
                        collection: row.get(0)?,
                        doc_id: row.get(1)?,
                        content_hash: row.get(2)?,
                        chunk_ids: serde_json::from_str(&chunk_ids_json).unwrap_or_default(),
                        sync_direction: Self::direction_from_str(&row.get::<_, String>(4)?),
                        sync_action: Self::action_from_str(&row.get::<_, String>(5)?),
                        synced_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(|e| SyncError::database(e.to_string()))
        })
    }

    async fn put_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        let chunk_ids_json = serde_json::to_string(&entry.chunk_ids)?;
        let direction = Self::direction_str(entry.sync_direction);
        let action = Self::action_str(entry.sync_action);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sync_log (collection, doc_id, content_hash, chunk_ids, sync_direction, sync_action, synced_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(collection, doc_id) DO UPDATE SET \
                 content_hash=excluded.content_hash, chunk_ids=excluded.chunk_ids, \
                 sync_direction=excluded.sync_direction, sync_action=excluded.sync_action, synced_at=excluded.synced_at",
                params![entry.collection, entry.doc_id, entry.content_hash, chunk_ids_json, direction, action, entry.synced_at],
            )
            .map_err(|e| SyncError::database(e.to_string()))?;
            Ok(())
        })
    }

    async fn delete_sync_log(&self, collection: &str, doc_id: &str) -> Result<()> {
        let collection = collection.to_string();
        let doc_id = doc_id.to_string();
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM sync_log WHERE collection = ?1 AND doc_id = ?2",
                params![collection, doc_id],
            )
            .map_err(|e| SyncError::database(e.to_string()))?;
            Ok(())
        })
    }

    async fn list_sync_log(&self, collection: &str) -> Result<Vec<SyncLogEntry>> {
        let collection = collection.to_string();
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT collection, doc_id, content_hash, chunk_ids, sync_direction, sync_action, synced_at \
                     FROM sync_log WHERE collection = ?1 ORDER BY doc_id",
                )
                .map_err(|e| SyncError::database(e.to_string()))?;
            let rows = stmt
                .query_map(params![collection], |row| {
                    let chunk_ids_json: String = row.get(3)?;
                    Ok(SyncLogEntry {
                        collection: row.get(0)?,
                        doc_id: row.get(1)?,
                        content_hash: row.get(2)?,
                        chunk_ids: serde_json::from_str(&chunk_ids_json).unwrap_or_default(),
                        sync_direction: Self::direction_from_str(&row.get::<_, String>(4)?),
                        sync_action: Self::action_from_str(&row.get::<_, String>(5)?),
                        synced_at: row.get(6)?,
                    })
                })
                .map_err(|e| SyncError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| SyncError::database(e.to_string()))?;
            Ok(rows)
        })
    }

    async fn get_sync_state(&self, collection: &str) -> Result<Option<SyncState>> {
        let collection = collection.to_string();
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT collection, last_sync_commit, last_sync_at, document_count, chunk_count, \
                 embedding_model, sync_status, error_message FROM sync_state WHERE collection = ?1",
                params![collection],
                |row| {
                    Ok(SyncState {
                        collection: row.get(0)?,
                        last_sync_commit: row.get(1)?,
                        last_sync_at: row.get(2)?,
                        document_count: row.get::<_, i64>(3)? as u64,
                        chunk_count: row.get::<_, i64>(4)? as u64,
                        embedding_model: row.get(5)?,
                        sync_status: Self::status_from_str(&row.get::<_, String>(6)?),
                        error_message: row.get(7)?,
                    })
                },
            )
            .optional()
            .map_err(|e| SyncError::database(e.to_string()))
        })
    }

    async fn put_sync_state(&self, state: &SyncState) -> Result<()> {
        let status = Self::status_str(state.sync_status);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sync_state (collection, last_sync_commit, last_sync_at, document_count, \
                 chunk_count, embedding_model, sync_status, error_message) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(collection) DO UPDATE SET \
                 last_sync_commit=excluded.last_sync_commit, last_sync_at=excluded.last_sync_at, \
                 document_count=excluded.document_count, chunk_count=excluded.chunk_count, \
                 embedding_model=excluded.embedding_model, sync_status=excluded.sync_status, \
                 error_message=excluded.error_message",
                params![
                    state.collection,
                    state.last_sync_commit,
                    state.last_sync_at,
                    state.document_count as i64,
                    state.chunk_count as i64,
                    state.embedding_model,
                    status,
                    state.error_message,
                ],
            )
            .map_err(|e| SyncError::database(e.to_string()))?;
            Ok(())
        })
    }

    async fn list_sync_states(&self) -> Result<Vec<SyncState>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT collection, last_sync_commit, last_sync_at, document_count, chunk_count, \
                     embedding_model, sync_status, error_message FROM sync_state ORDER BY collection",
                )
                .map_err(|e| SyncError::database(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(SyncState {
                        collection: row.get(0)?,
                        last_sync_commit: row.get(1)?,
                        last_sync_at: row.get(2)?,
                        document_count: row.get::<_, i64>(3)? as u64,
                        chunk_count: row.get::<_, i64>(4)? as u64,
                        embedding_model: row.get(5)?,
                        sync_status: Self::status_from_str(&row.get::<_, String>(6)?),
                        error_message: row.get(7)?,
                    })
                })
                .map_err(|e| SyncError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| SyncError::database(e.to_string()))?;
            Ok(rows)
        })
    }

    async fn get_local_change_flag(&self, collection: &str, doc_id: &str) -> Result<bool> {
        let collection = collection.to_string();
        let doc_id = doc_id.to_string();
        self.with_conn(|conn| {
            let flagged: Option<i64> = conn
                .query_row(
                    "SELECT flagged FROM local_change_flags WHERE collection = ?1 AND doc_id = ?2",
                    params![collection, doc_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| SyncError::database(e.to_string()))?;
            Ok(flagged.unwrap_or(0) != 0)
        })
    }

    async fn set_local_change_flag(&self, collection: &str, doc_id: &str, value: bool) -> Result<()> {
        let collection = collection.to_string();
        let doc_id = doc_id.to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO local_change_flags (collection, doc_id, flagged) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(collection, doc_id) DO UPDATE SET flagged=excluded.flagged",
                params![collection, doc_id, value as i64],
            )
            .map_err(|e| SyncError::database(e.to_string()))?;
            Ok(())
        })
    }

    async fn get_manifest(&self) -> Result<Option<RepositoryManifest>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT branch, commit_id, remote_url, initialized FROM manifest WHERE id = 0",
                [],
                |row| {
                    Ok(RepositoryManifest {
                        branch: row.get(0)?,
                        commit: row.get(1)?,
                        remote_url: row.get(2)?,
                        initialized: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()
            .map_err(|e| SyncError::database(e.to_string()))
        })
    }

    async fn put_manifest(&self, manifest: &RepositoryManifest) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO manifest (id, branch, commit_id, remote_url, initialized) VALUES (0, ?1, ?2, ?3, ?4) \
                 ON CONFLICT(id) DO UPDATE SET branch=excluded.branch, commit_id=excluded.commit_id, \
                 remote_url=excluded.remote_url, initialized=excluded.initialized",
                params![manifest.branch, manifest.commit, manifest.remote_url, manifest.initialized as i64],
            )
            .map_err(|e| SyncError::database(e.to_string()))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_core::types::SyncAction;

    #[tokio::test]
    async fn sync_log_round_trips() {
        let store = SqliteStateStore::open_memory().unwrap();
        let entry = SyncLogEntry {
            collection: "docs".into(),
            doc_id: "d1".into(),
            content_hash: "abc".into(),
            chunk_ids: vec!["d1_chunk_0".into()],
            sync_direction: SyncDirection::VsToXs,
            sync_action: SyncAction::Added,
            synced_at: 1,
        };
        store.put_sync_log(&entry).await.unwrap();
        let got = store.get_sync_log("docs", "d1").await.unwrap().unwrap();
        assert_eq!(got.content_hash, "abc");
        assert_eq!(got.chunk_ids, vec!["d1_chunk_0".to_string()]);

        store.delete_sync_log("docs", "d1").await.unwrap();
        assert!(store.get_sync_log("docs", "d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sync_state_round_trips() {
        let store = SqliteStateStore::open_memory().unwrap();
        let state = SyncState::new("docs", "model-a");
        store.put_sync_state(&state).await.unwrap();
        let got = store.get_sync_state("docs").await.unwrap().unwrap();
        assert_eq!(got.embedding_model, "model-a");
        assert_eq!(got.sync_status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn local_change_flag_defaults_false() {
        let store = SqliteStateStore::open_memory().unwrap();
        assert!(!store.get_local_change_flag("docs", "d1").await.unwrap());
        store.set_local_change_flag("docs", "d1", true).await.unwrap();
        assert!(store.get_local_change_flag("docs", "d1").await.unwrap());
    }

    #[tokio::test]
    async fn manifest_round_trips() {
        let store = SqliteStateStore::open_memory().unwrap();
        assert!(store.get_manifest().await.unwrap().is_none());
        let manifest = RepositoryManifest {
            branch: "main".into(),
            commit: Some("abc123".into()),
            remote_url: Some("https://example.invalid/repo".into()),
            initialized: true,
        };
        store.put_manifest(&manifest).await.unwrap();
        let got = store.get_manifest().await.unwrap().unwrap();
        assert_eq!(got.commit, Some("abc123".to_string()));
    }
}
