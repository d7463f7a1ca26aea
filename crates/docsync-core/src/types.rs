//! Core domain types shared across the sync engine: documents, collections,
//! chunks and the side-band bookkeeping records that tie the version store
//! and the vector store together.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Compute the lowercase-hex SHA-256 content hash of a document body.
///
/// This is the one true hash function for the engine: everything that
/// claims two pieces of content are identical goes through this.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(digest)
}

/// A unit of user content addressable by `(collection, doc_id)`.
///
/// The version store owns `content`, `content_hash` and `metadata`
/// exclusively; nothing outside the Stager/Hydrator mutates them directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub collection: String,
    pub content: String,
    pub content_hash: String,
    pub title: Option<String>,
    pub doc_type: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Document {
    /// Build a new document, computing its content hash from `content`.
    pub fn new(collection: impl Into<String>, doc_id: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let hash = content_hash(&content);
        let now = crate::config::now_millis();
        Self {
            doc_id: doc_id.into(),
            collection: collection.into(),
            content,
            content_hash: hash,
            title: None,
            doc_type: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// True if `new_content`'s hash differs from the one currently recorded.
    pub fn content_changed(&self, new_content: &str) -> bool {
        content_hash(new_content) != self.content_hash
    }
}

/// A named container of documents. The triple
/// `(embedding_model, chunk_size, chunk_overlap)` is part of the
/// collection's identity: changing it requires a full regenerate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub created_at: i64,
    pub updated_at: i64,
    pub document_count: u64,
}

impl Collection {
    pub fn new(name: impl Into<String>, embedding_model: impl Into<String>, chunk_size: usize, chunk_overlap: usize) -> Self {
        let now = crate::config::now_millis();
        Self {
            name: name.into(),
            display_name: None,
            description: None,
            embedding_model: embedding_model.into(),
            chunk_size,
            chunk_overlap,
            created_at: now,
            updated_at: now,
            document_count: 0,
        }
    }
}

/// A fragment of a `Document` placed in the vector store. Its id is always
/// `"{doc_id}_chunk_{chunk_index}"`; ids are never reused across edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub collection: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub content: String,
    pub content_hash: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Chunk {
    pub fn make_id(doc_id: &str, chunk_index: u32) -> String {
        format!("{doc_id}_chunk_{chunk_index}")
    }
}

/// Which side of a sync a delta or log entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    VsToXs,
    XsToVs,
}

/// The kind of change a Delta Detector or Sync Log entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Added,
    Modified,
    Deleted,
    Staged,
}

/// One side-band record per `(collection, doc_id)` known to be mirrored
/// between the two stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub collection: String,
    pub doc_id: String,
    pub content_hash: String,
    pub chunk_ids: Vec<String>,
    pub sync_direction: SyncDirection,
    pub sync_action: SyncAction,
    pub synced_at: i64,
}

/// Overall health of a collection's mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Clean,
    Pending,
    InProgress,
    Error,
}

/// Side-band per-collection sync bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub collection: String,
    pub last_sync_commit: Option<String>,
    pub last_sync_at: Option<i64>,
    pub document_count: u64,
    pub chunk_count: u64,
    pub embedding_model: String,
    pub sync_status: SyncStatus,
    pub error_message: Option<String>,
}

impl SyncState {
    pub fn new(collection: impl Into<String>, embedding_model: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            last_sync_commit: None,
            last_sync_at: None,
            document_count: 0,
            chunk_count: 0,
            embedding_model: embedding_model.into(),
            sync_status: SyncStatus::Pending,
            error_message: None,
        }
    }
}

/// Bootstrap anchor persisted outside the versioned tables: current branch,
/// current commit, remote and initialization mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryManifest {
    pub branch: String,
    pub commit: Option<String>,
    pub remote_url: Option<String>,
    pub initialized: bool,
}

impl Default for RepositoryManifest {
    fn default() -> Self {
        Self {
            branch: "main".to_string(),
            commit: None,
            remote_url: None,
            initialized: false,
        }
    }
}

/// Outcome bucket returned by every top-level Sync Manager operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Completed,
    NoChanges,
    LocalChangesExist,
    Conflicts,
    Failed,
}

/// Uniform result envelope returned by every top-level Sync Manager operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub commit_hash: Option<String>,
    pub added: u64,
    pub modified: u64,
    pub deleted: u64,
    pub staged_from_xs: u64,
    pub blocked_reason: Option<String>,
    pub offending: Vec<(String, String)>,
    pub error: Option<String>,
}

impl OperationResult {
    pub fn completed() -> Self {
        Self {
            status: OperationStatus::Completed,
            commit_hash: None,
            added: 0,
            modified: 0,
            deleted: 0,
            staged_from_xs: 0,
            blocked_reason: None,
            offending: Vec::new(),
            error: None,
        }
    }

    pub fn no_changes() -> Self {
        Self {
            status: OperationStatus::NoChanges,
            ..Self::completed()
        }
    }

    pub fn blocked(reason: impl Into<String>, offending: Vec<(String, String)>) -> Self {
        Self {
            status: OperationStatus::LocalChangesExist,
            blocked_reason: Some(reason.into()),
            offending,
            ..Self::completed()
        }
    }

    pub fn conflicts(reason: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Conflicts,
            blocked_reason: Some(reason.into()),
            ..Self::completed()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Failed,
            error: Some(error.into()),
            ..Self::completed()
        }
    }
}

/// Pending-change summary returned by `get_pending_changes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingChanges {
    pub collection: String,
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn total(&self) -> usize {
        self.new.len() + self.modified.len() + self.deleted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash("ABC"), content_hash("ABC"));
        assert_ne!(content_hash("ABC"), content_hash("ABD"));
    }

    #[test]
    fn test_document_content_changed() {
        let doc = Document::new("teachings", "d1", "fn main() {}");
        assert!(!doc.content_changed("fn main() {}"));
        assert!(doc.content_changed("fn main() { println!(); }"));
    }

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(Chunk::make_id("d1", 0), "d1_chunk_0");
        assert_eq!(Chunk::make_id("d1", 12), "d1_chunk_12");
    }

    #[test]
    fn test_pending_changes_empty() {
        let p = PendingChanges {
            collection: "c".into(),
            new: vec![],
            modified: vec![],
            deleted: vec![],
        };
        assert!(p.is_empty());
        assert_eq!(p.total(), 0);
    }
}
