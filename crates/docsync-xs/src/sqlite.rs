//! SQLite-based implementation of the `XsAdapter` capability set.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docsync_core::error::{Result, SyncError};
use docsync_core::traits::XsAdapter;
use rusqlite::{params, Connection, OpenFlags};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::schema::{vec_table_name, vec_table_schema, SCHEMA};

/// Embedded vector store backed by SQLite and the `sqlite-vec` extension.
///
/// Uses a blocking `Mutex` around the connection and runs SQLite calls on
/// the calling task via `spawn_blocking`-free synchronous access, matching
/// the single-writer-per-collection contract of the capability set.
pub struct SqliteXsAdapter {
    conn: Arc<Mutex<Connection>>,
    vec_enabled: bool,
}

// Connection access is always serialized through the Mutex.
unsafe impl Send for SqliteXsAdapter {}
unsafe impl Sync for SqliteXsAdapter {}

impl SqliteXsAdapter {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| SyncError::database(format!("failed to open xs database: {e}")))?;

        Self::init(conn, path)
    }

    /// Open an in-memory database, used by tests.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncError::database(format!("failed to open in-memory xs database: {e}")))?;
        Self::init(conn, Path::new(":memory:"))
    }

    fn init(conn: Connection, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| SyncError::database(format!("failed to initialize xs schema: {e}")))?;

        let vec_enabled = Self::try_load_vec_extension(&conn);
        if vec_enabled {
            info!("sqlite-vec extension loaded");
        } else {
            warn!("sqlite-vec extension not available; vector search disabled");
        }

        info!(path = %path.display(), "opened xs database");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            vec_enabled,
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA busy_timeout = 30000;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| SyncError::database(format!("failed to configure xs connection: {e}")))?;
        Ok(())
    }

    fn try_load_vec_extension(conn: &Connection) -> bool {
        let paths = [
            "vec0",
            "libsqlite_vec",
            "/usr/local/lib/libsqlite_vec",
            "/opt/homebrew/lib/libsqlite_vec",
        ];

        unsafe {
            if conn.load_extension_enable().is_err() {
                return false;
            }
            for path in paths {
                if conn.load_extension(path, None).is_ok() {
                    let _ = conn.load_extension_disable();
                    return true;
                }
            }
            let _ = conn.load_extension_disable();
        }
        false
    }

    pub fn vec_enabled(&self) -> bool {
        self.vec_enabled
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SyncError::database(e.to_string()))?;
        f(&conn)
    }

    fn embedding_dim(conn: &Connection, collection: &str) -> Result<usize> {
        let dim: i64 = conn
            .query_row(
                "SELECT embedding_dim FROM collections WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .map_err(|_| SyncError::xs_failure(format!("unknown collection: {collection}")))?;
        Ok(dim as usize)
    }

    fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
        v.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn row_to_metadata(metadata_str: &str) -> HashMap<String, Value> {
        serde_json::from_str(metadata_str).unwrap_or_default()
    }
}

#[async_trait]
impl XsAdapter for SqliteXsAdapter {
    async fn list_collections(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT name FROM collections ORDER BY name")
                .map_err(|e| SyncError::database(e.to_string()))?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| SyncError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| SyncError::database(e.to_string()))?;
            Ok(names)
        })
    }

    async fn create_collection(&self, name: &str, embedding_dim: usize) -> Result<()> {
        let name = name.to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO collections (name, embedding_dim, created_at) VALUES (?1, ?2, ?3)",
                params![name, embedding_dim as i64, docsync_core::config::now_millis()],
            )
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint") {
                    SyncError::invalid_argument(format!("collection already exists: {name}"))
                } else {
                    SyncError::database(format!("failed to create collection: {e}"))
                }
            })?;

            if self.vec_enabled {
                conn.execute_batch(&vec_table_schema(&name, embedding_dim))
                    .map_err(|e| SyncError::database(format!("failed to create vec table: {e}")))?;
            }

            debug!(collection = %name, dim = embedding_dim, "created xs collection");
            Ok(())
        })
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.with_conn(|conn| {
            if self.vec_enabled {
                let table = vec_table_name(&name);
                conn.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))
                    .map_err(|e| SyncError::database(e.to_string()))?;
            }
            let deleted = conn
                .execute("DELETE FROM collections WHERE name = ?1", params![name])
                .map_err(|e| SyncError::database(e.to_string()))?;
            if deleted == 0 {
                return Err(SyncError::invalid_argument(format!("unknown collection: {name}")));
            }
            debug!(collection = %name, "deleted xs collection");
            Ok(())
        })
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let collection = collection.to_string();
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM chunks WHERE collection = ?1",
                params![collection],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(|e| SyncError::database(e.to_string()))
        })
    }

    async fn add(
        &self,
        collection: &str,
        ids: &[String],
        docs: &[String],
        metadatas: &[HashMap<String, Value>],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        if ids.len() != docs.len() || ids.len() != metadatas.len() || ids.len() != embeddings.len() {
            return Err(SyncError::invalid_argument(
                "ids, docs, metadatas and embeddings must have equal length",
            ));
        }

        let collection = collection.to_string();
        let ids = ids.to_vec();
        let docs = docs.to_vec();
        let metadatas = metadatas.to_vec();
        let embeddings = embeddings.to_vec();

        self.with_conn(|conn| {
            let dim = if self.vec_enabled {
                Some(Self::embedding_dim(conn, &collection)?)
            } else {
                None
            };

            let tx = conn
                .unchecked_transaction()
                .map_err(|e| SyncError::database(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO chunks (chunk_id, collection, doc_id, content, metadata) VALUES (?1, ?2, ?3, ?4, ?5)",
                    )
                    .map_err(|e| SyncError::database(e.to_string()))?;

                for (i, id) in ids.iter().enumerate() {
                    let doc_id = metadatas[i]
                        .get("source_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let metadata_json = serde_json::to_string(&metadatas[i])?;
                    stmt.execute(params![id, collection, doc_id, docs[i], metadata_json])
                        .map_err(|e| SyncError::database(format!("failed to insert chunk: {e}")))?;
                }
            }

            if let Some(dim) = dim {
                let table = vec_table_name(&collection);
                let mut stmt = tx
                    .prepare(&format!("INSERT INTO {table} (chunk_id, embedding) VALUES (?1, ?2)"))
                    .map_err(|e| SyncError::database(e.to_string()))?;
                for (id, embedding) in ids.iter().zip(embeddings.iter()) {
                    if embedding.len() != dim {
                        return Err(SyncError::invalid_argument(format!(
                            "embedding for {id} has dimension {} but collection expects {dim}",
                            embedding.len()
                        )));
                    }
                    stmt.execute(params![id, Self::vec_to_bytes(embedding)])
                        .map_err(|e| SyncError::database(format!("failed to insert embedding: {e}")))?;
                }
            }

            tx.commit().map_err(|e| SyncError::database(e.to_string()))?;
            debug!(collection = %collection, count = ids.len(), "added chunks to xs");
            Ok(())
        })
    }

    async fn update(
        &self,
        collection: &str,
        ids: &[String],
        docs: &[String],
        metadatas: &[HashMap<String, Value>],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        if ids.len() != docs.len() || ids.len() != metadatas.len() || ids.len() != embeddings.len() {
            return Err(SyncError::invalid_argument(
                "ids, docs, metadatas and embeddings must have equal length",
            ));
        }

        let collection = collection.to_string();
        let ids = ids.to_vec();
        let docs = docs.to_vec();
        let metadatas = metadatas.to_vec();
        let embeddings = embeddings.to_vec();

        self.with_conn(|conn| {
            let dim = if self.vec_enabled {
                Some(Self::embedding_dim(conn, &collection)?)
            } else {
                None
            };

            let tx = conn
                .unchecked_transaction()
                .map_err(|e| SyncError::database(e.to_string()))?;

            for (i, id) in ids.iter().enumerate() {
                let metadata_json = serde_json::to_string(&metadatas[i])?;
                let changed = tx
                    .execute(
                        "UPDATE chunks SET content = ?1, metadata = ?2 WHERE chunk_id = ?3 AND collection = ?4",
                        params![docs[i], metadata_json, id, collection],
                    )
                    .map_err(|e| SyncError::database(e.to_string()))?;
                if changed == 0 {
                    return Err(SyncError::invalid_argument(format!("unknown chunk: {id}")));
                }
            }

            if let Some(dim) = dim {
                let table = vec_table_name(&collection);
                for (id, embedding) in ids.iter().zip(embeddings.iter()) {
                    if embedding.len() != dim {
                        return Err(SyncError::invalid_argument(format!(
                            "embedding for {id} has dimension {} but collection expects {dim}",
                            embedding.len()
                        )));
                    }
                    tx.execute(
                        &format!("DELETE FROM {table} WHERE chunk_id = ?1"),
                        params![id],
                    )
                    .map_err(|e| SyncError::database(e.to_string()))?;
                    tx.execute(
                        &format!("INSERT INTO {table} (chunk_id, embedding) VALUES (?1, ?2)"),
                        params![id, Self::vec_to_bytes(embedding)],
                    )
                    .map_err(|e| SyncError::database(e.to_string()))?;
                }
            }

            tx.commit().map_err(|e| SyncError::database(e.to_string()))?;
            debug!(collection = %collection, count = ids.len(), "updated chunks in xs");
            Ok(())
        })
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let collection = collection.to_string();
        let ids = ids.to_vec();
        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| SyncError::database(e.to_string()))?;

            if self.vec_enabled {
                let table = vec_table_name(&collection);
                for id in &ids {
                    tx.execute(&format!("DELETE FROM {table} WHERE chunk_id = ?1"), params![id])
                        .map_err(|e| SyncError::database(e.to_string()))?;
                }
            }

            for id in &ids {
                tx.execute(
                    "DELETE FROM chunks WHERE chunk_id = ?1 AND collection = ?2",
                    params![id, collection],
                )
                .map_err(|e| SyncError::database(e.to_string()))?;
            }

            tx.commit().map_err(|e| SyncError::database(e.to_string()))?;
            debug!(collection = %collection, count = ids.len(), "deleted chunks from xs");
            Ok(())
        })
    }

    async fn get(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<(Vec<String>, Vec<String>, Vec<HashMap<String, Value>>)> {
        let collection = collection.to_string();
        let ids = ids.to_vec();
        self.with_conn(|conn| {
            let mut out_ids = Vec::with_capacity(ids.len());
            let mut out_docs = Vec::with_capacity(ids.len());
            let mut out_meta = Vec::with_capacity(ids.len());

            for id in &ids {
                let row: Option<(String, String)> = conn
                    .query_row(
                        "SELECT content, metadata FROM chunks WHERE chunk_id = ?1 AND collection = ?2",
                        params![id, collection],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .ok();

                if let Some((content, metadata_str)) = row {
                    out_ids.push(id.clone());
                    out_docs.push(content);
                    out_meta.push(Self::row_to_metadata(&metadata_str));
                }
            }

            Ok((out_ids, out_docs, out_meta))
        })
    }

    async fn list_ids_with_metadata(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, HashMap<String, Value>)>> {
        let collection = collection.to_string();
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT chunk_id, metadata FROM chunks WHERE collection = ?1 ORDER BY chunk_id")
                .map_err(|e| SyncError::database(e.to_string()))?;

            let rows = stmt
                .query_map(params![collection], |row| {
                    let chunk_id: String = row.get(0)?;
                    let metadata_str: String = row.get(1)?;
                    Ok((chunk_id, metadata_str))
                })
                .map_err(|e| SyncError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| SyncError::database(e.to_string()))?;

            Ok(rows
                .into_iter()
                .map(|(id, metadata_str)| (id, Self::row_to_metadata(&metadata_str)))
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(source_id: &str) -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("source_id".to_string(), Value::String(source_id.to_string()));
        m
    }

    #[tokio::test]
    async fn create_and_list_collections() {
        let xs = SqliteXsAdapter::open_memory().unwrap();
        xs.create_collection("docs", 3).await.unwrap();
        assert_eq!(xs.list_collections().await.unwrap(), vec!["docs".to_string()]);
    }

    #[tokio::test]
    async fn add_and_get_round_trips() {
        let xs = SqliteXsAdapter::open_memory().unwrap();
        xs.create_collection("docs", 3).await.unwrap();

        let ids = vec!["doc1_chunk_0".to_string()];
        let docs = vec!["hello world".to_string()];
        let metas = vec![meta("doc1")];
        let embeddings = vec![vec![0.1, 0.2, 0.3]];

        xs.add("docs", &ids, &docs, &metas, &embeddings).await.unwrap();
        assert_eq!(xs.count("docs").await.unwrap(), 1);

        let (got_ids, got_docs, got_meta) = xs.get("docs", &ids).await.unwrap();
        assert_eq!(got_ids, ids);
        assert_eq!(got_docs, docs);
        assert_eq!(got_meta[0].get("source_id").unwrap(), "doc1");
    }

    #[tokio::test]
    async fn update_replaces_content_and_embedding() {
        let xs = SqliteXsAdapter::open_memory().unwrap();
        xs.create_collection("docs", 2).await.unwrap();

        let ids = vec!["doc1_chunk_0".to_string()];
        xs.add(
            "docs",
            &ids,
            &["first".to_string()],
            &[meta("doc1")],
            &[vec![0.0, 0.0]],
        )
        .await
        .unwrap();

        xs.update(
            "docs",
            &ids,
            &["second".to_string()],
            &[meta("doc1")],
            &[vec![1.0, 1.0]],
        )
        .await
        .unwrap();

        let (_, docs, _) = xs.get("docs", &ids).await.unwrap();
        assert_eq!(docs[0], "second");
    }

    #[tokio::test]
    async fn delete_removes_chunk() {
        let xs = SqliteXsAdapter::open_memory().unwrap();
        xs.create_collection("docs", 2).await.unwrap();
        let ids = vec!["doc1_chunk_0".to_string()];
        xs.add("docs", &ids, &["x".to_string()], &[meta("doc1")], &[vec![0.0, 0.0]])
            .await
            .unwrap();

        xs.delete("docs", &ids).await.unwrap();
        assert_eq!(xs.count("docs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_ids_with_metadata_returns_all_chunks() {
        let xs = SqliteXsAdapter::open_memory().unwrap();
        xs.create_collection("docs", 2).await.unwrap();
        xs.add(
            "docs",
            &["a_chunk_0".to_string(), "b_chunk_0".to_string()],
            &["a".to_string(), "b".to_string()],
            &[meta("a"), meta("b")],
            &[vec![0.0, 0.0], vec![1.0, 1.0]],
        )
        .await
        .unwrap();

        let listed = xs.list_ids_with_metadata("docs").await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn delete_collection_removes_its_chunks() {
        let xs = SqliteXsAdapter::open_memory().unwrap();
        xs.create_collection("docs", 2).await.unwrap();
        xs.add(
            "docs",
            &["a_chunk_0".to_string()],
            &["a".to_string()],
            &[meta("a")],
            &[vec![0.0, 0.0]],
        )
        .await
        .unwrap();

        xs.delete_collection("docs").await.unwrap();
        assert!(xs.list_collections().await.unwrap().is_empty());
    }
}
