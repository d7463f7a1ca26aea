//! Stager (§4.5): applies XS → VS deltas to the versioned documents table,
//! staged for the next commit but never committing itself.

use docsync_core::error::{Result, SyncError};
use docsync_core::traits::{StateStore, VsAdapter, XsAdapter};
use docsync_core::types::{Collection, SyncStatus};
use tracing::{info, warn};

use crate::delta::{document_from_xs_chunks, group_xs_documents, DeltaDetector};
use crate::vs_schema;

#[derive(Debug, Clone, Default)]
pub struct StagerResult {
    pub added: u64,
    pub modified: u64,
    pub deleted: u64,
    pub staged_rows: u64,
}

pub struct Stager;

impl Stager {
    /// Apply every pending XS → VS change for `collection` and stage it
    /// with a single `add_all`. Never commits.
    pub async fn run(
        vs: &dyn VsAdapter,
        xs: &dyn XsAdapter,
        state: &dyn StateStore,
        collection: &Collection,
    ) -> Result<StagerResult> {
        if !vs_schema::schema_present(vs).await {
            return Err(SyncError::SchemaMissing {
                detail: "documents table absent from version store".to_string(),
            });
        }

        if let Some(sync_state) = state.get_sync_state(&collection.name).await? {
            if sync_state.sync_status == SyncStatus::InProgress {
                return Err(SyncError::internal(format!(
                    "sync already in progress for collection {}",
                    collection.name
                )));
            }
        }

        let delta = DeltaDetector::xs_to_vs_pending(xs, state, &collection.name, collection.chunk_overlap).await?;
        if delta.is_empty() {
            return Ok(StagerResult::default());
        }

        let last_known_clean = state
            .get_sync_state(&collection.name)
            .await?
            .and_then(|s| s.last_sync_commit);

        match Self::apply_batch(vs, xs, state, collection, &delta).await {
            Ok(result) => {
                vs.add_all().await.map_err(|e| SyncError::StagerFailure {
                    message: format!("add_all failed after staging {} rows: {e}", result.staged_rows),
                })?;
                info!(
                    collection = %collection.name,
                    added = result.added,
                    modified = result.modified,
                    deleted = result.deleted,
                    "staged xs->vs delta"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(collection = %collection.name, error = %e, "stager batch failed, unwinding");
                if let Some(commit) = last_known_clean {
                    let _ = vs.reset_hard(&commit).await;
                }
                Err(SyncError::StagerFailure {
                    message: e.to_string(),
                })
            }
        }
    }

    async fn apply_batch(
        vs: &dyn VsAdapter,
        xs: &dyn XsAdapter,
        state: &dyn StateStore,
        collection: &Collection,
        delta: &crate::delta::Delta,
    ) -> Result<StagerResult> {
        let grouped = group_xs_documents(xs, &collection.name).await?;
        let mut result = StagerResult::default();

        for doc_id in &delta.new {
            let chunks = grouped
                .get(doc_id)
                .ok_or_else(|| SyncError::inconsistent(format!("new doc {doc_id} has no xs chunks")))?;
            let doc = document_from_xs_chunks(&collection.name, doc_id, chunks, collection.chunk_overlap)?;
            vs_schema::insert_document(vs, &doc).await?;
            result.added += 1;
            result.staged_rows += 1;
        }

        for doc_id in &delta.modified {
            let chunks = grouped
                .get(doc_id)
                .ok_or_else(|| SyncError::inconsistent(format!("modified doc {doc_id} has no xs chunks")))?;
            let doc = document_from_xs_chunks(&collection.name, doc_id, chunks, collection.chunk_overlap)?;
            vs_schema::update_document(vs, &doc).await?;
            result.modified += 1;
            result.staged_rows += 1;
        }

        for doc_id in &delta.deleted {
            vs_schema::delete_document(vs, &collection.name, doc_id).await?;
            state.delete_sync_log(&collection.name, doc_id).await?;
            result.deleted += 1;
            result.staged_rows += 1;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use docsync_codec::metadata::SystemFields;
    use docsync_core::types::{content_hash, Collection, SyncDirection, SyncLogEntry, SyncAction};
    use docsync_xs::SqliteXsAdapter;

    use crate::state_store::SqliteStateStore;
    use crate::test_support::SqlVsAdapter;

    use super::*;

    fn test_collection() -> Collection {
        Collection::new("docs", "test-model", 512, 0)
    }

    async fn seed_xs_chunk(xs: &SqliteXsAdapter, doc_id: &str, content: &str) {
        let hash = content_hash(content);
        let system = SystemFields {
            source_id: doc_id.to_string(),
            collection_name: "docs".to_string(),
            content_hash: hash,
            chunk_index: 0,
            total_chunks: 1,
            source_commit: None,
        };
        let metadata = docsync_codec::partition_egress(&HashMap::new(), &system);
        let chunk_id = docsync_codec::chunk_id(doc_id, 0);
        xs.add(
            "docs",
            &[chunk_id],
            &[content.to_string()],
            &[metadata],
            &[vec![0.1, 0.2, 0.3]],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn refuses_when_schema_missing() {
        let vs = SqlVsAdapter::new();
        let xs = SqliteXsAdapter::open_memory().unwrap();
        let state = SqliteStateStore::open_memory().unwrap();
        let collection = test_collection();

        let err = Stager::run(&vs, &xs, &state, &collection).await.unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISSING");
    }

    #[tokio::test]
    async fn stages_new_document_from_xs() {
        let vs = SqlVsAdapter::new();
        vs_schema::ensure_schema(&vs).await.unwrap();
        let xs = SqliteXsAdapter::open_memory().unwrap();
        let state = SqliteStateStore::open_memory().unwrap();
        let collection = test_collection();

        xs.create_collection("docs", 3).await.unwrap();
        seed_xs_chunk(&xs, "doc1", "hello world").await;

        let result = Stager::run(&vs, &xs, &state, &collection).await.unwrap();
        assert_eq!(result.added, 1);
        assert_eq!(result.modified, 0);
        assert_eq!(result.deleted, 0);

        let doc = vs_schema::get_document(&vs, "docs", "doc1").await.unwrap().unwrap();
        assert_eq!(doc.content, "hello world");
    }

    #[tokio::test]
    async fn empty_delta_is_a_no_op() {
        let vs = SqlVsAdapter::new();
        vs_schema::ensure_schema(&vs).await.unwrap();
        let xs = SqliteXsAdapter::open_memory().unwrap();
        let state = SqliteStateStore::open_memory().unwrap();
        let collection = test_collection();
        xs.create_collection("docs", 3).await.unwrap();

        let result = Stager::run(&vs, &xs, &state, &collection).await.unwrap();
        assert_eq!(result.staged_rows, 0);
    }

    #[tokio::test]
    async fn deleted_document_removes_row_and_sync_log() {
        let vs = SqlVsAdapter::new();
        vs_schema::ensure_schema(&vs).await.unwrap();
        let xs = SqliteXsAdapter::open_memory().unwrap();
        let state = SqliteStateStore::open_memory().unwrap();
        let collection = test_collection();
        xs.create_collection("docs", 3).await.unwrap();

        let doc = docsync_core::types::Document::new("docs", "doc1", "stale content");
        vs_schema::insert_document(&vs, &doc).await.unwrap();
        state
            .put_sync_log(&SyncLogEntry {
                collection: "docs".to_string(),
                doc_id: "doc1".to_string(),
                content_hash: doc.content_hash.clone(),
                chunk_ids: vec![docsync_codec::chunk_id("doc1", 0)],
                sync_direction: SyncDirection::XsToVs,
                sync_action: SyncAction::Added,
                synced_at: 0,
            })
            .await
            .unwrap();

        let result = Stager::run(&vs, &xs, &state, &collection).await.unwrap();
        assert_eq!(result.deleted, 1);
        assert!(vs_schema::get_document(&vs, "docs", "doc1").await.unwrap().is_none());
        assert!(state.get_sync_log("docs", "doc1").await.unwrap().is_none());
    }
}
