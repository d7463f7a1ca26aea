//! Sync Manager (§4.7): the top-level state machine. Every operation
//! acquires the repository-wide exclusive lock for its full duration, so
//! the version store and vector store are always mutated in lock-step
//! (§5). The lock is released by a drop guard so a cancelled or panicking
//! operation never leaves it held.

use std::collections::HashMap;
use std::sync::Arc;

use docsync_core::error::{Result, SyncError};
use docsync_core::traits::{Embedder, StateStore, VsAdapter, XsAdapter};
use docsync_core::types::{
    Collection, OperationResult, PendingChanges, SyncState, SyncStatus,
};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::delta::DeltaDetector;
use crate::hydrator::Hydrator;
use crate::stager::Stager;
use crate::vs_schema;

/// A point-in-time view of repository health, returned by `status()`.
#[derive(Debug, Clone)]
pub struct RepositoryStatus {
    pub branch: String,
    pub head: Option<String>,
    pub uncommitted_vs: Vec<String>,
    pub pending_xs_to_vs: Vec<PendingChanges>,
    pub sync_state_per_collection: Vec<SyncState>,
}

/// Options for `bootstrap`: everything needed to stand a repository up from
/// a Manifest when VS infrastructure, XS infrastructure, or both are missing.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub remote_url: Option<String>,
    pub branch: String,
}

/// Ties the version store, vector store, side-band state store and
/// embedder together behind the eight top-level operations named in §4.7.
pub struct SyncManager {
    vs: Arc<dyn VsAdapter>,
    xs: Arc<dyn XsAdapter>,
    state: Arc<dyn StateStore>,
    embedder: Arc<dyn Embedder>,
    lock: Mutex<()>,
}

impl SyncManager {
    pub fn new(
        vs: Arc<dyn VsAdapter>,
        xs: Arc<dyn XsAdapter>,
        state: Arc<dyn StateStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            vs,
            xs,
            state,
            embedder,
            lock: Mutex::new(()),
        }
    }

    async fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    /// Collections known to the state store, each paired with its Collection
    /// record from the version store's `collections` table.
    async fn tracked_collections(&self) -> Result<Vec<Collection>> {
        let mut out = Vec::new();
        for sync_state in self.state.list_sync_states().await? {
            if let Some(collection) = vs_schema::get_collection(self.vs.as_ref(), &sync_state.collection).await? {
                out.push(collection);
            }
        }
        Ok(out)
    }

    async fn pending_xs_to_vs_all(&self) -> Result<Vec<PendingChanges>> {
        let mut out = Vec::new();
        for collection in self.tracked_collections().await? {
            let delta = DeltaDetector::xs_to_vs_pending(
                self.xs.as_ref(),
                self.state.as_ref(),
                &collection.name,
                collection.chunk_overlap,
            )
            .await?;
            if !delta.is_empty() {
                out.push(PendingChanges {
                    collection: collection.name,
                    new: delta.new,
                    modified: delta.modified,
                    deleted: delta.deleted,
                });
            }
        }
        Ok(out)
    }

    /// Record an operation failure in Sync State for `collection` and
    /// unwind any staged-but-uncommitted VS changes back to the last known
    /// clean commit. Used for both cancellation and timeout failures (§5).
    async fn unwind(&self, collection: &str, message: &str) {
        warn!(collection, message, "unwinding after failed operation");
        if let Ok(Some(mut sync_state)) = self.state.get_sync_state(collection).await {
            if let Some(commit) = sync_state.last_sync_commit.clone() {
                let _ = self.vs.reset_hard(&commit).await;
            }
            sync_state.sync_status = SyncStatus::Error;
            sync_state.error_message = Some(message.to_string());
            let _ = self.state.put_sync_state(&sync_state).await;
        }
    }

    /// Used when VS is empty but XS holds user data: create the documents
    /// schema if absent, stage the whole collection, commit, then write
    /// Sync State. Fails if the VS already has documents for this collection.
    #[instrument(skip(self, collection, cancel))]
    pub async fn initialize_from_xs(
        &self,
        collection: &Collection,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<OperationResult> {
        let _lock = self.guard().await;
        Self::check_cancelled(cancel)?;

        if !vs_schema::schema_present(self.vs.as_ref()).await {
            vs_schema::ensure_schema(self.vs.as_ref()).await?;
        } else if !vs_schema::list_documents(self.vs.as_ref(), &collection.name).await?.is_empty() {
            return Ok(OperationResult::failed(format!(
                "version store already has documents for collection {}",
                collection.name
            )));
        }

        vs_schema::upsert_collection(self.vs.as_ref(), collection).await?;

        let stager_result = match Stager::run(self.vs.as_ref(), self.xs.as_ref(), self.state.as_ref(), collection).await {
            Ok(r) => r,
            Err(e) => {
                self.unwind(&collection.name, &e.to_string()).await;
                return Ok(OperationResult::failed(e.to_string()));
            }
        };

        let commit_hash = self.vs.commit(message).await?;

        self.state
            .put_sync_state(&SyncState {
                collection: collection.name.clone(),
                last_sync_commit: Some(commit_hash.clone()),
                last_sync_at: Some(docsync_core::config::now_millis()),
                document_count: stager_result.added,
                chunk_count: 0,
                embedding_model: collection.embedding_model.clone(),
                sync_status: SyncStatus::Clean,
                error_message: None,
            })
            .await?;

        info!(collection = %collection.name, commit = %commit_hash, "initialized version store from vector store");
        let mut result = OperationResult::completed();
        result.commit_hash = Some(commit_hash);
        result.added = stager_result.added;
        Ok(result)
    }

    /// If `auto_stage`, run the XS→VS Delta Detector and Stager for every
    /// tracked collection, then commit. Sync State's `last_sync_commit`
    /// advances to the new head.
    #[instrument(skip(self, cancel))]
    pub async fn commit(&self, message: &str, auto_stage: bool, cancel: &CancellationToken) -> Result<OperationResult> {
        let _lock = self.guard().await;
        Self::check_cancelled(cancel)?;

        let collections = self.tracked_collections().await?;
        let mut total = OperationResult::completed();

        if auto_stage {
            for collection in &collections {
                Self::check_cancelled(cancel)?;
                match Stager::run(self.vs.as_ref(), self.xs.as_ref(), self.state.as_ref(), collection).await {
                    Ok(r) => {
                        total.added += r.added;
                        total.modified += r.modified;
                        total.deleted += r.deleted;
                        total.staged_from_xs += r.staged_rows;
                    }
                    Err(e) => {
                        self.unwind(&collection.name, &e.to_string()).await;
                        return Ok(OperationResult::failed(e.to_string()));
                    }
                }
            }
        }

        if total.staged_from_xs == 0 {
            return Ok(OperationResult::no_changes());
        }

        let commit_hash = self.vs.commit(message).await?;
        total.commit_hash = Some(commit_hash.clone());

        for collection in &collections {
            if let Some(mut sync_state) = self.state.get_sync_state(&collection.name).await? {
                sync_state.last_sync_commit = Some(commit_hash.clone());
                sync_state.last_sync_at = Some(docsync_core::config::now_millis());
                sync_state.sync_status = SyncStatus::Clean;
                self.state.put_sync_state(&sync_state).await?;
            }
        }

        info!(commit = %commit_hash, added = total.added, modified = total.modified, deleted = total.deleted, "committed");
        Ok(total)
    }

    /// Refuses with `LocalChangesExist` when any tracked collection has
    /// pending XS→VS changes, unless `force`. On conflict-free pull,
    /// hydrates every tracked collection incrementally from old to new head.
    #[instrument(skip(self, cancel))]
    pub async fn pull(&self, remote: &str, branch: &str, force: bool, cancel: &CancellationToken) -> Result<OperationResult> {
        let _lock = self.guard().await;
        Self::check_cancelled(cancel)?;

        if !force {
            let pending = self.pending_xs_to_vs_all().await?;
            if !pending.is_empty() {
                let offending: Vec<(String, String)> = pending
                    .iter()
                    .flat_map(|p| p.new.iter().chain(p.modified.iter()).map(move |id| (p.collection.clone(), id.clone())))
                    .collect();
                return Ok(OperationResult::blocked("local changes exist in xs; pass force to override", offending));
            }
        }

        let old_head = self.vs.head_commit().await?;
        let outcome = self.vs.pull(remote, branch).await?;
        if outcome.had_conflicts {
            return Ok(OperationResult::conflicts("pull produced conflicts"));
        }

        let mut result = OperationResult::completed();
        result.commit_hash = outcome.new_head.clone();

        if let (Some(from), Some(to)) = (old_head, outcome.new_head.clone()) {
            if from != to {
                for collection in self.tracked_collections().await? {
                    Self::check_cancelled(cancel)?;
                    match Hydrator::incremental(self.vs.as_ref(), self.xs.as_ref(), self.state.as_ref(), self.embedder.as_ref(), &collection, &from, &to).await {
                        Ok(h) => {
                            result.added += h.added;
                            result.modified += h.modified;
                            result.deleted += h.deleted;
                        }
                        Err(e) => {
                            self.unwind(&collection.name, &e.to_string()).await;
                            return Ok(OperationResult::failed(e.to_string()));
                        }
                    }
                    self.advance_sync_state(&collection.name, outcome.new_head.clone()).await?;
                }
            }
        }

        Ok(result)
    }

    /// Same `LocalChangesExist` guard as `pull`. Hydrates incrementally from
    /// each collection's last synced commit to the new head, or runs a full
    /// regenerate when the two commits are unrelated.
    #[instrument(skip(self, cancel))]
    pub async fn checkout(
        &self,
        reference: &str,
        create: bool,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<OperationResult> {
        let _lock = self.guard().await;
        Self::check_cancelled(cancel)?;

        if !force {
            let pending = self.pending_xs_to_vs_all().await?;
            if !pending.is_empty() {
                return Ok(OperationResult::blocked("local changes exist in xs; pass force to override", Vec::new()));
            }
        }

        self.vs.checkout(reference, create).await?;
        let new_head = self.vs.head_commit().await?;
        let mut result = OperationResult::completed();
        result.commit_hash = new_head.clone();

        for collection in self.tracked_collections().await? {
            Self::check_cancelled(cancel)?;
            let sync_state = self.state.get_sync_state(&collection.name).await?;
            let last = sync_state.as_ref().and_then(|s| s.last_sync_commit.clone());

            if last == new_head {
                continue;
            }

            let outcome = match (&last, &new_head) {
                (Some(from), Some(to)) => {
                    if self.vs.is_ancestor(from, to).await? || self.vs.is_ancestor(to, from).await? {
                        Hydrator::incremental(self.vs.as_ref(), self.xs.as_ref(), self.state.as_ref(), self.embedder.as_ref(), &collection, from, to).await
                    } else {
                        Hydrator::full_regenerate(self.vs.as_ref(), self.xs.as_ref(), self.state.as_ref(), self.embedder.as_ref(), &collection).await
                    }
                }
                _ => Hydrator::full_regenerate(self.vs.as_ref(), self.xs.as_ref(), self.state.as_ref(), self.embedder.as_ref(), &collection).await,
            };

            match outcome {
                Ok(h) => {
                    result.added += h.added;
                    result.modified += h.modified;
                    result.deleted += h.deleted;
                }
                Err(e) => {
                    self.unwind(&collection.name, &e.to_string()).await;
                    return Ok(OperationResult::failed(e.to_string()));
                }
            }
            self.advance_sync_state(&collection.name, new_head.clone()).await?;
        }

        Ok(result)
    }

    /// `LocalChangesExist` guard. On a clean merge, hydrates incrementally
    /// from the pre-merge head to the merge commit; on conflicts, surfaces
    /// them row-level and stops without touching XS.
    #[instrument(skip(self, cancel))]
    pub async fn merge(&self, source_branch: &str, force: bool, cancel: &CancellationToken) -> Result<OperationResult> {
        let _lock = self.guard().await;
        Self::check_cancelled(cancel)?;

        if !force {
            let pending = self.pending_xs_to_vs_all().await?;
            if !pending.is_empty() {
                return Ok(OperationResult::blocked("local changes exist in xs; pass force to override", Vec::new()));
            }
        }

        let pre_merge_head = self.vs.head_commit().await?;
        let outcome = self.vs.merge(source_branch).await?;

        if outcome.had_conflicts {
            let mut offending = Vec::new();
            for collection in self.tracked_collections().await? {
                for row in self.vs.conflicts("documents").await? {
                    offending.push((collection.name.clone(), row.row_id));
                }
            }
            return Ok(OperationResult::blocked("merge conflicts", offending));
        }

        let mut result = OperationResult::completed();
        result.commit_hash = outcome.merge_commit.clone();

        if let (Some(from), Some(to)) = (pre_merge_head, outcome.merge_commit.clone()) {
            for collection in self.tracked_collections().await? {
                Self::check_cancelled(cancel)?;
                match Hydrator::incremental(self.vs.as_ref(), self.xs.as_ref(), self.state.as_ref(), self.embedder.as_ref(), &collection, &from, &to).await {
                    Ok(h) => {
                        result.added += h.added;
                        result.modified += h.modified;
                        result.deleted += h.deleted;
                    }
                    Err(e) => {
                        self.unwind(&collection.name, &e.to_string()).await;
                        return Ok(OperationResult::failed(e.to_string()));
                    }
                }
                self.advance_sync_state(&collection.name, outcome.merge_commit.clone()).await?;
            }
        }

        Ok(result)
    }

    /// Destructive: hard-resets VS to `commit`, then fully regenerates
    /// every tracked collection's XS chunks from the reset state.
    #[instrument(skip(self, cancel))]
    pub async fn reset(&self, commit: &str, cancel: &CancellationToken) -> Result<OperationResult> {
        let _lock = self.guard().await;
        Self::check_cancelled(cancel)?;

        self.vs.reset_hard(commit).await?;
        let mut result = OperationResult::completed();
        result.commit_hash = Some(commit.to_string());

        for collection in self.tracked_collections().await? {
            Self::check_cancelled(cancel)?;
            match Hydrator::full_regenerate(self.vs.as_ref(), self.xs.as_ref(), self.state.as_ref(), self.embedder.as_ref(), &collection).await {
                Ok(h) => result.added += h.added,
                Err(e) => {
                    self.unwind(&collection.name, &e.to_string()).await;
                    return Ok(OperationResult::failed(e.to_string()));
                }
            }
        }

        Ok(result)
    }

    /// Read-only snapshot of repository health. Never mutates VS, XS or
    /// the State Store.
    #[instrument(skip(self, cancel))]
    pub async fn status(&self, cancel: &CancellationToken) -> Result<RepositoryStatus> {
        let _lock = self.guard().await;
        Self::check_cancelled(cancel)?;

        let vs_status = self.vs.status().await?;
        let head = self.vs.head_commit().await?;
        let pending = self.pending_xs_to_vs_all().await?;
        let sync_states = self.state.list_sync_states().await?;

        Ok(RepositoryStatus {
            branch: vs_status.branch,
            head,
            uncommitted_vs: vs_status.staged,
            pending_xs_to_vs: pending,
            sync_state_per_collection: sync_states,
        })
    }

    /// Given a Manifest, detects and performs the minimum required to bring
    /// VS infrastructure, XS infrastructure and path alignment up to date,
    /// then advances VS to the Manifest's recorded commit/branch.
    #[instrument(skip(self, options, cancel))]
    pub async fn bootstrap(&self, options: &BootstrapOptions, cancel: &CancellationToken) -> Result<OperationResult> {
        let _lock = self.guard().await;
        Self::check_cancelled(cancel)?;

        let manifest = self.state.get_manifest().await?;

        if self.vs.head_commit().await?.is_none() {
            if let Some(remote_url) = options.remote_url.as_ref().or(manifest.as_ref().and_then(|m| m.remote_url.as_ref())) {
                self.vs.clone_repo(remote_url).await?;
                info!(remote = %remote_url, "bootstrapped version store from remote");
            } else {
                self.vs.init().await?;
                info!("initialized empty version store");
            }
        }

        if !vs_schema::schema_present(self.vs.as_ref()).await {
            vs_schema::ensure_schema(self.vs.as_ref()).await?;
        }

        let mut result = OperationResult::completed();
        for collection in self.tracked_collections().await? {
            Self::check_cancelled(cancel)?;
            if self.xs.list_collections().await?.iter().any(|c| c == &collection.name) {
                continue;
            }
            match Hydrator::full_regenerate(self.vs.as_ref(), self.xs.as_ref(), self.state.as_ref(), self.embedder.as_ref(), &collection).await {
                Ok(h) => result.added += h.added,
                Err(e) => return Ok(OperationResult::failed(e.to_string())),
            }
        }

        if let Some(manifest) = manifest {
            if manifest.branch != self.vs.current_branch().await? {
                self.vs.checkout(&manifest.branch, false).await?;
            }
            if let Some(commit) = &manifest.commit {
                if self.vs.head_commit().await?.as_deref() != Some(commit.as_str()) {
                    self.vs.reset_hard(commit).await?;
                }
            }
        }

        self.state
            .put_manifest(&docsync_core::types::RepositoryManifest {
                branch: options.branch.clone(),
                commit: self.vs.head_commit().await?,
                remote_url: options.remote_url.clone(),
                initialized: true,
            })
            .await?;

        result.commit_hash = self.vs.head_commit().await?;
        Ok(result)
    }

    /// Enumerate XS→VS pending changes for one collection without mutating
    /// anything.
    pub async fn get_pending_changes(&self, collection: &Collection) -> Result<PendingChanges> {
        let delta = DeltaDetector::xs_to_vs_pending(self.xs.as_ref(), self.state.as_ref(), &collection.name, collection.chunk_overlap).await?;
        Ok(PendingChanges {
            collection: collection.name.clone(),
            new: delta.new,
            modified: delta.modified,
            deleted: delta.deleted,
        })
    }

    async fn advance_sync_state(&self, collection: &str, new_head: Option<String>) -> Result<()> {
        if let Some(mut sync_state) = self.state.get_sync_state(collection).await? {
            sync_state.last_sync_commit = new_head;
            sync_state.last_sync_at = Some(docsync_core::config::now_millis());
            sync_state.sync_status = SyncStatus::Clean;
            self.state.put_sync_state(&sync_state).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use docsync_xs::SqliteXsAdapter;

    use crate::state_store::SqliteStateStore;
    use crate::test_support::SqlVsAdapter;

    use super::*;

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2]).collect())
        }

        fn model_id(&self) -> &str {
            "fake-model"
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn make_manager() -> (SyncManager, Arc<SqliteXsAdapter>) {
        let vs = Arc::new(SqlVsAdapter::new());
        let xs = Arc::new(SqliteXsAdapter::open_memory().unwrap());
        let state = Arc::new(SqliteStateStore::open_memory().unwrap());
        let embedder = Arc::new(FakeEmbedder);
        (SyncManager::new(vs, xs.clone(), state, embedder), xs)
    }

    #[tokio::test]
    async fn initialize_from_xs_stages_and_commits() {
        let (manager, xs) = make_manager();
        let collection = Collection::new("docs", "fake-model", 512, 0);
        xs.create_collection("docs", 2).await.unwrap();

        let hash = docsync_core::types::content_hash("hello world");
        let system = docsync_codec::metadata::SystemFields {
            source_id: "doc1".to_string(),
            collection_name: "docs".to_string(),
            content_hash: hash,
            chunk_index: 0,
            total_chunks: 1,
            source_commit: None,
        };
        let metadata = docsync_codec::partition_egress(&HashMap::new(), &system);
        xs.add(
            "docs",
            &["doc1_chunk_0".to_string()],
            &["hello world".to_string()],
            &[metadata],
            &[vec![0.1, 0.2]],
        )
        .await
        .unwrap();

        let result = manager
            .initialize_from_xs(&collection, "initial import", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, docsync_core::types::OperationStatus::Completed);
        assert_eq!(result.added, 1);
        assert!(result.commit_hash.is_some());
    }

    #[tokio::test]
    async fn status_reports_empty_repository() {
        let (manager, _xs) = make_manager();
        let status = manager.status(&CancellationToken::new()).await.unwrap();
        assert!(status.sync_state_per_collection.is_empty());
        assert!(status.pending_xs_to_vs.is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_before_any_work() {
        let (manager, _xs) = make_manager();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = manager.status(&cancel).await.unwrap_err();
        assert_eq!(err.error_code(), "CANCELLED");
    }
}
