//! Test-only fixtures shared by the engine's unit tests.

#![cfg(test)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use docsync_core::error::{Result, SyncError};
use docsync_core::traits::{
    ConflictResolution, ConflictRow, DiffRow, MergeOutcome, PullOutcome, VsAdapter, VsBranch,
    VsCommit, VsStatus,
};
use rusqlite::Connection;
use serde_json::Value;

/// A `VsAdapter` whose `exec`/`query_json` run against a real in-memory
/// SQLite connection, so `vs_schema`'s generated SQL can be exercised the
/// way it would run against the real version store's query surface.
/// Branch/commit/diff operations are not needed by the Stager or Hydrator
/// unit tests and are stubbed.
pub struct SqlVsAdapter {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqlVsAdapter {
    pub fn new() -> Self {
        Self {
            conn: Mutex::new(Connection::open_in_memory().unwrap()),
            path: PathBuf::from("/test/vs"),
        }
    }
}

#[async_trait]
impl VsAdapter for SqlVsAdapter {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn clone_repo(&self, _remote_url: &str) -> Result<()> {
        Ok(())
    }

    async fn status(&self) -> Result<VsStatus> {
        Ok(VsStatus::default())
    }

    async fn current_branch(&self) -> Result<String> {
        Ok("main".to_string())
    }

    async fn head_commit(&self) -> Result<Option<String>> {
        Ok(Some("testcommit0".to_string()))
    }

    async fn list_branches(&self) -> Result<Vec<VsBranch>> {
        Ok(Vec::new())
    }

    async fn create_branch(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn checkout(&self, _reference: &str, _create: bool) -> Result<()> {
        Ok(())
    }

    async fn add_all(&self) -> Result<()> {
        Ok(())
    }

    async fn commit(&self, _message: &str) -> Result<String> {
        Ok("testcommit1".to_string())
    }

    async fn push(&self, _remote: &str, _branch: &str) -> Result<()> {
        Ok(())
    }

    async fn pull(&self, _remote: &str, _branch: &str) -> Result<PullOutcome> {
        Ok(PullOutcome {
            success: true,
            fast_forward: true,
            had_conflicts: false,
            old_head: None,
            new_head: None,
        })
    }

    async fn fetch(&self, _remote: &str) -> Result<()> {
        Ok(())
    }

    async fn merge(&self, _source_branch: &str) -> Result<MergeOutcome> {
        Ok(MergeOutcome {
            success: true,
            had_conflicts: false,
            merge_commit: None,
        })
    }

    async fn conflicts(&self, _table: &str) -> Result<Vec<ConflictRow>> {
        Ok(Vec::new())
    }

    async fn resolve(&self, _table: &str, _row_id: &str, _side: ConflictResolution) -> Result<()> {
        Ok(())
    }

    async fn reset_hard(&self, _reference: &str) -> Result<()> {
        Ok(())
    }

    async fn diff(&self, _from: &str, _to: &str, _table: &str) -> Result<Vec<DiffRow>> {
        Ok(Vec::new())
    }

    async fn log(&self, _limit: usize) -> Result<Vec<VsCommit>> {
        Ok(Vec::new())
    }

    async fn is_ancestor(&self, _ancestor: &str, _descendant: &str) -> Result<bool> {
        Ok(false)
    }

    async fn exec(&self, sql: &str) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(sql)
            .map_err(|e| SyncError::executable_failure(e.to_string()))?;
        Ok(conn.changes())
    }

    async fn query_json(&self, sql: &str) -> Result<Vec<Value>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| SyncError::executable_failure(e.to_string()))?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let rows = stmt
            .query_map([], |row| {
                let mut obj = serde_json::Map::new();
                for (i, name) in column_names.iter().enumerate() {
                    let value: Value = match row.get_ref(i).unwrap() {
                        rusqlite::types::ValueRef::Null => Value::Null,
                        rusqlite::types::ValueRef::Integer(n) => Value::from(n),
                        rusqlite::types::ValueRef::Real(f) => Value::from(f),
                        rusqlite::types::ValueRef::Text(t) => {
                            Value::String(String::from_utf8_lossy(t).into_owned())
                        }
                        rusqlite::types::ValueRef::Blob(_) => Value::Null,
                    };
                    obj.insert(name.clone(), value);
                }
                Ok(Value::Object(obj))
            })
            .map_err(|e| SyncError::executable_failure(e.to_string()))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SyncError::executable_failure(e.to_string()))
    }

    fn effective_path(&self) -> &Path {
        &self.path
    }
}
