//! Capability sets that decouple the sync engine from any one backend.
//!
//! The Sync Manager is generic over these traits so an alternative version
//! store or vector store can be plugged in without touching engine logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// Result of a status query against the version store.
#[derive(Debug, Clone, Default)]
pub struct VsStatus {
    pub branch: String,
    pub staged: Vec<String>,
    pub modified: Vec<String>,
}

/// One row of a version-store branch listing.
#[derive(Debug, Clone)]
pub struct VsBranch {
    pub name: String,
    pub is_current: bool,
    pub head_commit: String,
}

/// One row of a version-store commit log.
#[derive(Debug, Clone)]
pub struct VsCommit {
    pub hash: String,
    pub message: String,
    pub author: String,
    pub timestamp: i64,
}

/// The kind of change a diff row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Added,
    Modified,
    Removed,
}

/// One row of a diff between two commits over a table.
#[derive(Debug, Clone)]
pub struct DiffRow {
    pub kind: DiffKind,
    pub id: String,
    pub from_hash: Option<String>,
    pub to_hash: Option<String>,
    pub to_content: Option<String>,
}

/// Outcome of a pull.
#[derive(Debug, Clone)]
pub struct PullOutcome {
    pub success: bool,
    pub fast_forward: bool,
    pub had_conflicts: bool,
    pub old_head: Option<String>,
    pub new_head: Option<String>,
}

/// Outcome of a merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub success: bool,
    pub had_conflicts: bool,
    pub merge_commit: Option<String>,
}

/// One conflicted row surfaced by the version store.
#[derive(Debug, Clone)]
pub struct ConflictRow {
    pub table: String,
    pub row_id: String,
}

/// Which side of a conflict to keep when resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    Ours,
    Theirs,
}

/// Typed, async surface over the external version-store command-line tool.
///
/// Every method maps a non-zero exit code and known stderr patterns to a
/// specific `SyncError` variant (`EmptyRepository`, `RemoteNotFound`, ...);
/// an unrecognized failure becomes `ExecutableFailure` carrying the raw
/// stderr. Implementations must honor the configured command timeout.
#[async_trait]
pub trait VsAdapter: Send + Sync {
    async fn init(&self) -> Result<()>;
    async fn clone_repo(&self, remote_url: &str) -> Result<()>;
    async fn status(&self) -> Result<VsStatus>;
    async fn current_branch(&self) -> Result<String>;
    async fn head_commit(&self) -> Result<Option<String>>;
    async fn list_branches(&self) -> Result<Vec<VsBranch>>;
    async fn create_branch(&self, name: &str) -> Result<()>;
    async fn checkout(&self, reference: &str, create: bool) -> Result<()>;
    async fn add_all(&self) -> Result<()>;
    async fn commit(&self, message: &str) -> Result<String>;
    async fn push(&self, remote: &str, branch: &str) -> Result<()>;
    async fn pull(&self, remote: &str, branch: &str) -> Result<PullOutcome>;
    async fn fetch(&self, remote: &str) -> Result<()>;
    async fn merge(&self, source_branch: &str) -> Result<MergeOutcome>;
    async fn conflicts(&self, table: &str) -> Result<Vec<ConflictRow>>;
    async fn resolve(&self, table: &str, row_id: &str, side: ConflictResolution) -> Result<()>;
    async fn reset_hard(&self, reference: &str) -> Result<()>;
    async fn diff(&self, from: &str, to: &str, table: &str) -> Result<Vec<DiffRow>>;
    async fn log(&self, limit: usize) -> Result<Vec<VsCommit>>;
    async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool>;
    async fn exec(&self, sql: &str) -> Result<u64>;
    async fn query_json(&self, sql: &str) -> Result<Vec<serde_json::Value>>;

    /// The directory the adapter is actually operating against, which may
    /// differ from the configured path once path alignment (see the engine's
    /// bootstrap logic) has resolved a nested clone.
    fn effective_path(&self) -> &std::path::Path;
}

/// Typed, async surface over the external vector store.
///
/// Single-writer per collection: callers must serialize writes through the
/// Sync Manager rather than interleaving them directly.
#[async_trait]
pub trait XsAdapter: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<String>>;
    async fn create_collection(&self, name: &str, embedding_dim: usize) -> Result<()>;
    async fn delete_collection(&self, name: &str) -> Result<()>;
    async fn count(&self, collection: &str) -> Result<u64>;

    async fn add(
        &self,
        collection: &str,
        ids: &[String],
        docs: &[String],
        metadatas: &[HashMap<String, serde_json::Value>],
        embeddings: &[Vec<f32>],
    ) -> Result<()>;

    async fn update(
        &self,
        collection: &str,
        ids: &[String],
        docs: &[String],
        metadatas: &[HashMap<String, serde_json::Value>],
        embeddings: &[Vec<f32>],
    ) -> Result<()>;

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    async fn get(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<(Vec<String>, Vec<String>, Vec<HashMap<String, serde_json::Value>>)>;

    async fn list_ids_with_metadata(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, HashMap<String, serde_json::Value>)>>;
}

/// Side-band persistence for Sync Log entries, Sync State and Local-Change
/// flags. Lives outside the version store so it is never versioned or
/// transferred by push/pull.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_sync_log(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<crate::types::SyncLogEntry>>;

    async fn put_sync_log(&self, entry: &crate::types::SyncLogEntry) -> Result<()>;

    async fn delete_sync_log(&self, collection: &str, doc_id: &str) -> Result<()>;

    async fn list_sync_log(&self, collection: &str) -> Result<Vec<crate::types::SyncLogEntry>>;

    async fn get_sync_state(&self, collection: &str) -> Result<Option<crate::types::SyncState>>;

    async fn put_sync_state(&self, state: &crate::types::SyncState) -> Result<()>;

    async fn list_sync_states(&self) -> Result<Vec<crate::types::SyncState>>;

    async fn get_local_change_flag(&self, collection: &str, doc_id: &str) -> Result<bool>;

    async fn set_local_change_flag(&self, collection: &str, doc_id: &str, value: bool) -> Result<()>;

    async fn get_manifest(&self) -> Result<Option<crate::types::RepositoryManifest>>;

    async fn put_manifest(&self, manifest: &crate::types::RepositoryManifest) -> Result<()>;
}

/// Caller-supplied embedding function. The engine treats the embedding
/// model as an opaque, external collaborator: it only needs a stable model
/// identifier and a way to turn text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn model_id(&self) -> &str;
    fn dimension(&self) -> usize;
}
