//! Hydrator (§4.6): applies VS → XS deltas, either incrementally from a
//! VS diff stream or by fully regenerating a collection's chunks.

use std::collections::HashMap;

use docsync_codec::metadata::SystemFields;
use docsync_core::config::now_millis;
use docsync_core::error::{Result, SyncError};
use docsync_core::traits::{DiffKind, Embedder, StateStore, VsAdapter, XsAdapter};
use docsync_core::types::{Collection, SyncAction, SyncDirection, SyncLogEntry, SyncState, SyncStatus};
use tracing::{info, warn};

use crate::vs_schema;

#[derive(Debug, Clone, Default)]
pub struct HydrationResult {
    pub added: u64,
    pub modified: u64,
    pub deleted: u64,
}

pub struct Hydrator;

impl Hydrator {
    /// Incremental hydration: consume the VS diff between `from_commit` and
    /// `to_commit` over the documents table and apply it to the XS.
    pub async fn incremental(
        vs: &dyn VsAdapter,
        xs: &dyn XsAdapter,
        state: &dyn StateStore,
        embedder: &dyn Embedder,
        collection: &Collection,
        from_commit: &str,
        to_commit: &str,
    ) -> Result<HydrationResult> {
        Self::check_model(state, collection).await?;

        let mut rows = vs.diff(from_commit, to_commit, "documents").await?;
        rows.sort_by(|a, b| a.id.cmp(&b.id));

        let mut result = HydrationResult::default();

        for row in rows {
            match row.kind {
                DiffKind::Added => {
                    let content = row.to_content.ok_or_else(|| {
                        SyncError::inconsistent(format!("added diff row {} has no content", row.id))
                    })?;
                    Self::hydrate_one(xs, state, embedder, collection, &row.id, &content, Some(to_commit)).await?;
                    result.added += 1;
                }
                DiffKind::Modified => {
                    Self::delete_existing_chunks(xs, state, collection, &row.id).await?;
                    let content = row.to_content.ok_or_else(|| {
                        SyncError::inconsistent(format!("modified diff row {} has no content", row.id))
                    })?;
                    Self::hydrate_one(xs, state, embedder, collection, &row.id, &content, Some(to_commit)).await?;
                    result.modified += 1;
                }
                DiffKind::Removed => {
                    Self::delete_existing_chunks(xs, state, collection, &row.id).await?;
                    result.deleted += 1;
                }
            }
        }

        info!(
            collection = %collection.name,
            added = result.added,
            modified = result.modified,
            deleted = result.deleted,
            "hydrated incremental vs->xs delta"
        );
        Ok(result)
    }

    /// Drop and recreate the XS collection, then re-chunk and re-embed
    /// every document in the VS for `collection`.
    pub async fn full_regenerate(
        vs: &dyn VsAdapter,
        xs: &dyn XsAdapter,
        state: &dyn StateStore,
        embedder: &dyn Embedder,
        collection: &Collection,
    ) -> Result<HydrationResult> {
        if xs.list_collections().await?.iter().any(|c| c == &collection.name) {
            xs.delete_collection(&collection.name).await?;
        }
        xs.create_collection(&collection.name, embedder.dimension()).await?;

        let head = vs.head_commit().await?;
        let documents = vs_schema::list_documents(vs, &collection.name).await?;
        let mut result = HydrationResult::default();

        for doc in &documents {
            Self::hydrate_one(xs, state, embedder, collection, &doc.doc_id, &doc.content, head.as_deref()).await?;
            result.added += 1;
        }

        let chunk_count: u64 = state
            .list_sync_log(&collection.name)
            .await?
            .iter()
            .map(|e| e.chunk_ids.len() as u64)
            .sum();

        state
            .put_sync_state(&SyncState {
                collection: collection.name.clone(),
                last_sync_commit: head,
                last_sync_at: Some(now_millis()),
                document_count: documents.len() as u64,
                chunk_count,
                embedding_model: collection.embedding_model.clone(),
                sync_status: SyncStatus::Clean,
                error_message: None,
            })
            .await?;

        info!(collection = %collection.name, documents = documents.len(), "full regenerate complete");
        Ok(result)
    }

    async fn check_model(state: &dyn StateStore, collection: &Collection) -> Result<()> {
        if let Some(sync_state) = state.get_sync_state(&collection.name).await? {
            if sync_state.embedding_model != collection.embedding_model {
                return Err(SyncError::ModelMismatch {
                    recorded: sync_state.embedding_model,
                    configured: collection.embedding_model.clone(),
                });
            }
        }
        Ok(())
    }

    async fn delete_existing_chunks(
        xs: &dyn XsAdapter,
        state: &dyn StateStore,
        collection: &Collection,
        doc_id: &str,
    ) -> Result<()> {
        if let Some(entry) = state.get_sync_log(&collection.name, doc_id).await? {
            if !entry.chunk_ids.is_empty() {
                xs.delete(&collection.name, &entry.chunk_ids).await?;
            }
            state.delete_sync_log(&collection.name, doc_id).await?;
        }
        Ok(())
    }

    async fn hydrate_one(
        xs: &dyn XsAdapter,
        state: &dyn StateStore,
        embedder: &dyn Embedder,
        collection: &Collection,
        doc_id: &str,
        content: &str,
        source_commit: Option<&str>,
    ) -> Result<()> {
        let content_hash = docsync_core::types::content_hash(content);
        let chunks = docsync_codec::chunk_bytes(content, collection.chunk_size, collection.chunk_overlap)?;
        let total_chunks = chunks.len() as u32;

        let mut ids = Vec::with_capacity(chunks.len());
        let mut metadatas = Vec::with_capacity(chunks.len());
        for (i, _) in chunks.iter().enumerate() {
            ids.push(docsync_codec::chunk_id(doc_id, i as u32));
            let system = SystemFields {
                source_id: doc_id.to_string(),
                collection_name: collection.name.clone(),
                content_hash: content_hash.clone(),
                chunk_index: i as u32,
                total_chunks,
                source_commit: source_commit.map(str::to_string),
            };
            metadatas.push(docsync_codec::partition_egress(&HashMap::new(), &system));
        }

        let embeddings = embedder.embed(&chunks).await?;
        if embeddings.len() != chunks.len() {
            return Err(SyncError::HydratorFailure {
                message: format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    chunks.len()
                ),
            });
        }

        if let Err(e) = xs.add(&collection.name, &ids, &chunks, &metadatas, &embeddings).await {
            warn!(doc_id, error = %e, "hydrator failed to write chunks, cleaning up partial write");
            let _ = xs.delete(&collection.name, &ids).await;
            return Err(SyncError::HydratorFailure { message: e.to_string() });
        }

        state
            .put_sync_log(&SyncLogEntry {
                collection: collection.name.clone(),
                doc_id: doc_id.to_string(),
                content_hash,
                chunk_ids: ids,
                sync_direction: SyncDirection::VsToXs,
                sync_action: SyncAction::Added,
                synced_at: now_millis(),
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use docsync_core::traits::{DiffKind, DiffRow};
    use docsync_core::types::Collection;
    use docsync_xs::SqliteXsAdapter;

    use crate::state_store::SqliteStateStore;
    use crate::test_support::SqlVsAdapter;

    use super::*;

    struct FakeEmbedder {
        dim: usize,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.5; self.dim]).collect())
        }

        fn model_id(&self) -> &str {
            "fake-model"
        }

        fn dimension(&self) -> usize {
            self.dim
        }
    }

    fn test_collection() -> Collection {
        Collection::new("docs", "fake-model", 512, 0)
    }

    #[tokio::test]
    async fn full_regenerate_writes_chunks_and_sync_state() {
        let vs = SqlVsAdapter::new();
        crate::vs_schema::ensure_schema(&vs).await.unwrap();
        let xs = SqliteXsAdapter::open_memory().unwrap();
        let state = SqliteStateStore::open_memory().unwrap();
        let embedder = FakeEmbedder { dim: 3 };
        let collection = test_collection();

        let doc = docsync_core::types::Document::new("docs", "doc1", "hello world");
        crate::vs_schema::insert_document(&vs, &doc).await.unwrap();

        let result = Hydrator::full_regenerate(&vs, &xs, &state, &embedder, &collection)
            .await
            .unwrap();
        assert_eq!(result.added, 1);

        let entry = state.get_sync_log("docs", "doc1").await.unwrap().unwrap();
        assert_eq!(entry.chunk_ids, vec!["doc1_chunk_0".to_string()]);

        let sync_state = state.get_sync_state("docs").await.unwrap().unwrap();
        assert_eq!(sync_state.document_count, 1);
        assert_eq!(sync_state.embedding_model, "fake-model");
    }

    #[tokio::test]
    async fn incremental_refuses_on_model_mismatch() {
        let vs = SqlVsAdapter::new();
        let xs = SqliteXsAdapter::open_memory().unwrap();
        let state = SqliteStateStore::open_memory().unwrap();
        let embedder = FakeEmbedder { dim: 3 };
        let collection = test_collection();

        state
            .put_sync_state(&docsync_core::types::SyncState::new("docs", "old-model"))
            .await
            .unwrap();

        let err = Hydrator::incremental(&vs, &xs, &state, &embedder, &collection, "c1", "c2")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MODEL_MISMATCH");
    }

    #[tokio::test]
    async fn incremental_added_row_writes_chunks() {
        let vs = SqlVsAdapter::new();
        let xs = SqliteXsAdapter::open_memory().unwrap();
        let state = SqliteStateStore::open_memory().unwrap();
        let embedder = FakeEmbedder { dim: 3 };
        let collection = test_collection();
        xs.create_collection("docs", 3).await.unwrap();

        let row = DiffRow {
            kind: DiffKind::Added,
            id: "doc1".to_string(),
            from_hash: None,
            to_hash: Some(docsync_core::types::content_hash("hello")),
            to_content: Some("hello".to_string()),
        };
        Hydrator::hydrate_one(&xs, &state, &embedder, &collection, &row.id, row.to_content.as_ref().unwrap(), Some("c2"))
            .await
            .unwrap();

        let entry = state.get_sync_log("docs", "doc1").await.unwrap().unwrap();
        assert_eq!(entry.sync_action, docsync_core::types::SyncAction::Added);
        let (ids, _, _) = xs.get("docs", &entry.chunk_ids).await.unwrap();
        assert_eq!(ids.len(), 1);
    }
}
