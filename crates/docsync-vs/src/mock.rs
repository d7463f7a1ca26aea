//! In-memory fake of the `VsAdapter` capability set.
//!
//! Used by engine tests so the Sync Manager, Delta Detector, Stager and
//! Hydrator can be exercised without a real external CLI. Operates entirely
//! on in-process maps rather than a filesystem or subprocess.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docsync_core::error::{Result, SyncError};
use docsync_core::traits::{
    ConflictResolution, ConflictRow, DiffKind, DiffRow, MergeOutcome, PullOutcome, VsAdapter,
    VsBranch, VsCommit, VsStatus,
};
use serde_json::Value;

pub type TableRow = HashMap<String, Value>;
pub type Table = HashMap<String, TableRow>;

#[derive(Debug, Clone)]
struct Commit {
    hash: String,
    message: String,
    parent: Option<String>,
    tables: HashMap<String, Table>,
}

#[derive(Default)]
struct Repo {
    commits: HashMap<String, Commit>,
    branches: HashMap<String, String>,
    current_branch: String,
    working: HashMap<String, Table>,
    staged: bool,
    next_commit_seq: u64,
}

/// Shared remote registry a group of `MockVsAdapter`s can push to / pull from.
#[derive(Clone, Default)]
pub struct MockRemote(Arc<Mutex<HashMap<String, (String, HashMap<String, Commit>)>>>);

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MockVsAdapter {
    repo: Mutex<Repo>,
    remote: MockRemote,
    path: PathBuf,
}

impl MockVsAdapter {
    pub fn new() -> Self {
        Self {
            repo: Mutex::new(Repo {
                current_branch: "main".to_string(),
                ..Repo::default()
            }),
            remote: MockRemote::new(),
            path: PathBuf::from("/mock/vs"),
        }
    }

    pub fn with_remote(remote: MockRemote) -> Self {
        Self {
            repo: Mutex::new(Repo {
                current_branch: "main".to_string(),
                ..Repo::default()
            }),
            remote,
            path: PathBuf::from("/mock/vs"),
        }
    }

    pub fn remote(&self) -> MockRemote {
        self.remote.clone()
    }

    /// Insert or update a row in the working copy of `table` without going
    /// through the trait (a test-only convenience for seeding state).
    pub fn seed_row(&self, table: &str, row_id: &str, row: TableRow) {
        let mut repo = self.repo.lock().unwrap();
        repo.working.entry(table.to_string()).or_default().insert(row_id.to_string(), row);
        repo.staged = true;
    }

    fn next_hash(repo: &mut Repo) -> String {
        repo.next_commit_seq += 1;
        format!("mockcommit{:08x}", repo.next_commit_seq)
    }
}

impl Default for MockVsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VsAdapter for MockVsAdapter {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn clone_repo(&self, remote_url: &str) -> Result<()> {
        let remote = self.remote.0.lock().unwrap();
        let entry = remote
            .get(remote_url)
            .ok_or_else(|| SyncError::RemoteNotFound {
                name: remote_url.to_string(),
            })?;
        let (head, commits) = entry.clone();
        drop(remote);
        let mut repo = self.repo.lock().unwrap();
        repo.commits = commits;
        repo.branches.insert("main".to_string(), head);
        repo.current_branch = "main".to_string();
        Ok(())
    }

    async fn status(&self) -> Result<VsStatus> {
        let repo = self.repo.lock().unwrap();
        let staged: Vec<String> = if repo.staged {
            repo.working.keys().cloned().collect()
        } else {
            Vec::new()
        };
        Ok(VsStatus {
            branch: repo.current_branch.clone(),
            staged,
            modified: Vec::new(),
        })
    }

    async fn current_branch(&self) -> Result<String> {
        Ok(self.repo.lock().unwrap().current_branch.clone())
    }

    async fn head_commit(&self) -> Result<Option<String>> {
        let repo = self.repo.lock().unwrap();
        Ok(repo.branches.get(&repo.current_branch).cloned())
    }

    async fn list_branches(&self) -> Result<Vec<VsBranch>> {
        let repo = self.repo.lock().unwrap();
        Ok(repo
            .branches
            .iter()
            .map(|(name, head)| VsBranch {
                name: name.clone(),
                is_current: *name == repo.current_branch,
                head_commit: head.clone(),
            })
            .collect())
    }

    async fn create_branch(&self, name: &str) -> Result<()> {
        let mut repo = self.repo.lock().unwrap();
        let head = repo.branches.get(&repo.current_branch).cloned();
        if let Some(head) = head {
            repo.branches.insert(name.to_string(), head);
        } else {
            return Err(SyncError::EmptyRepository);
        }
        Ok(())
    }

    async fn checkout(&self, reference: &str, create: bool) -> Result<()> {
        let mut repo = self.repo.lock().unwrap();
        if create && !repo.branches.contains_key(reference) {
            let head = repo.branches.get(&repo.current_branch).cloned();
            repo.branches.insert(reference.to_string(), head.unwrap_or_default());
        }
        if !repo.branches.contains_key(reference) {
            return Err(SyncError::executable_failure(format!("unknown ref: {reference}")));
        }
        repo.current_branch = reference.to_string();
        let head_commit = repo.branches.get(reference).cloned().unwrap_or_default();
        if let Some(commit) = repo.commits.get(&head_commit) {
            repo.working = commit.tables.clone();
        } else {
            repo.working.clear();
        }
        repo.staged = false;
        Ok(())
    }

    async fn add_all(&self) -> Result<()> {
        let mut repo = self.repo.lock().unwrap();
        repo.staged = true;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<String> {
        let mut repo = self.repo.lock().unwrap();
        let parent = repo.branches.get(&repo.current_branch).cloned();
        let hash = Self::next_hash(&mut repo);
        let tables = repo.working.clone();
        let commit = Commit {
            hash: hash.clone(),
            message: message.to_string(),
            parent,
            tables,
        };
        let branch = repo.current_branch.clone();
        repo.commits.insert(hash.clone(), commit);
        repo.branches.insert(branch, hash.clone());
        repo.staged = false;
        Ok(hash)
    }

    async fn push(&self, remote: &str, _branch: &str) -> Result<()> {
        let repo = self.repo.lock().unwrap();
        let head = repo
            .branches
            .get(&repo.current_branch)
            .cloned()
            .ok_or(SyncError::EmptyRepository)?;
        let commits = repo.commits.clone();
        drop(repo);
        let mut remote_map = self.remote.0.lock().unwrap();
        remote_map.insert(remote.to_string(), (head, commits));
        Ok(())
    }

    async fn pull(&self, remote: &str, branch: &str) -> Result<PullOutcome> {
        let old_head = self.head_commit().await?;
        let remote_map = self.remote.0.lock().unwrap();
        let entry = remote_map
            .get(remote)
            .ok_or_else(|| SyncError::RemoteNotFound {
                name: remote.to_string(),
            })?
            .clone();
        drop(remote_map);
        let (remote_head, remote_commits) = entry;

        if old_head.as_deref() == Some(remote_head.as_str()) {
            return Ok(PullOutcome {
                success: true,
                fast_forward: false,
                had_conflicts: false,
                old_head: old_head.clone(),
                new_head: old_head,
            });
        }

        let mut repo = self.repo.lock().unwrap();
        for (hash, commit) in remote_commits {
            repo.commits.entry(hash).or_insert(commit);
        }
        repo.branches.insert(branch.to_string(), remote_head.clone());
        if repo.current_branch == branch {
            if let Some(commit) = repo.commits.get(&remote_head) {
                repo.working = commit.tables.clone();
            }
        }
        Ok(PullOutcome {
            success: true,
            fast_forward: true,
            had_conflicts: false,
            old_head,
            new_head: Some(remote_head),
        })
    }

    async fn fetch(&self, _remote: &str) -> Result<()> {
        Ok(())
    }

    async fn merge(&self, source_branch: &str) -> Result<MergeOutcome> {
        let mut repo = self.repo.lock().unwrap();
        let source_head = repo
            .branches
            .get(source_branch)
            .cloned()
            .ok_or_else(|| SyncError::executable_failure(format!("unknown branch: {source_branch}")))?;
        let target_head = repo.branches.get(&repo.current_branch).cloned();

        let source_tables = repo
            .commits
            .get(&source_head)
            .map(|c| c.tables.clone())
            .unwrap_or_default();
        let mut merged = target_head
            .as_ref()
            .and_then(|h| repo.commits.get(h))
            .map(|c| c.tables.clone())
            .unwrap_or_default();

        for (table, rows) in source_tables {
            let entry = merged.entry(table).or_default();
            for (row_id, row) in rows {
                entry.insert(row_id, row);
            }
        }

        let hash = Self::next_hash(&mut repo);
        let commit = Commit {
            hash: hash.clone(),
            message: format!("merge {source_branch}"),
            parent: target_head,
            tables: merged.clone(),
        };
        let branch = repo.current_branch.clone();
        repo.commits.insert(hash.clone(), commit);
        repo.branches.insert(branch, hash.clone());
        repo.working = merged;
        repo.staged = false;

        Ok(MergeOutcome {
            success: true,
            had_conflicts: false,
            merge_commit: Some(hash),
        })
    }

    async fn conflicts(&self, _table: &str) -> Result<Vec<ConflictRow>> {
        Ok(Vec::new())
    }

    async fn resolve(&self, _table: &str, _row_id: &str, _side: ConflictResolution) -> Result<()> {
        Ok(())
    }

    async fn reset_hard(&self, reference: &str) -> Result<()> {
        let mut repo = self.repo.lock().unwrap();
        let branch = repo.current_branch.clone();
        let target_hash = repo.branches.get(reference).cloned().unwrap_or_else(|| reference.to_string());
        if let Some(commit) = repo.commits.get(&target_hash) {
            repo.working = commit.tables.clone();
            repo.branches.insert(branch, target_hash);
        } else {
            return Err(SyncError::executable_failure(format!("unknown commit: {reference}")));
        }
        repo.staged = false;
        Ok(())
    }

    async fn diff(&self, from: &str, to: &str, table: &str) -> Result<Vec<DiffRow>> {
        let repo = self.repo.lock().unwrap();
        let from_table: Table = repo
            .commits
            .get(from)
            .and_then(|c| c.tables.get(table).cloned())
            .unwrap_or_default();
        let to_table: Table = repo
            .commits
            .get(to)
            .and_then(|c| c.tables.get(table).cloned())
            .unwrap_or_default();

        let mut rows = Vec::new();
        for (id, to_row) in &to_table {
            let to_hash = to_row.get("content_hash").and_then(Value::as_str).map(str::to_string);
            match from_table.get(id) {
                None => rows.push(DiffRow {
                    kind: DiffKind::Added,
                    id: id.clone(),
                    from_hash: None,
                    to_hash: to_hash.clone(),
                    to_content: to_row.get("content").and_then(Value::as_str).map(str::to_string),
                }),
                Some(from_row) => {
                    let from_hash = from_row.get("content_hash").and_then(Value::as_str).map(str::to_string);
                    if from_hash != to_hash {
                        rows.push(DiffRow {
                            kind: DiffKind::Modified,
                            id: id.clone(),
                            from_hash,
                            to_hash: to_hash.clone(),
                            to_content: to_row.get("content").and_then(Value::as_str).map(str::to_string),
                        });
                    }
                }
            }
        }
        for (id, from_row) in &from_table {
            if !to_table.contains_key(id) {
                rows.push(DiffRow {
                    kind: DiffKind::Removed,
                    id: id.clone(),
                    from_hash: from_row.get("content_hash").and_then(Value::as_str).map(str::to_string),
                    to_hash: None,
                    to_content: None,
                });
            }
        }
        Ok(rows)
    }

    async fn log(&self, limit: usize) -> Result<Vec<VsCommit>> {
        let repo = self.repo.lock().unwrap();
        let mut out = Vec::new();
        let mut current = repo.branches.get(&repo.current_branch).cloned();
        while let Some(hash) = current {
            let Some(commit) = repo.commits.get(&hash) else { break };
            out.push(VsCommit {
                hash: commit.hash.clone(),
                message: commit.message.clone(),
                author: "mock".to_string(),
                timestamp: 0,
            });
            if out.len() >= limit {
                break;
            }
            current = commit.parent.clone();
        }
        Ok(out)
    }

    async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let repo = self.repo.lock().unwrap();
        let mut current = Some(descendant.to_string());
        while let Some(hash) = current {
            if hash == ancestor {
                return Ok(true);
            }
            current = repo.commits.get(&hash).and_then(|c| c.parent.clone());
        }
        Ok(false)
    }

    async fn exec(&self, _sql: &str) -> Result<u64> {
        Ok(0)
    }

    async fn query_json(&self, _sql: &str) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    fn effective_path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_then_head_matches() {
        let vs = MockVsAdapter::new();
        vs.add_all().await.unwrap();
        let hash = vs.commit("initial").await.unwrap();
        assert_eq!(vs.head_commit().await.unwrap(), Some(hash));
    }

    #[tokio::test]
    async fn push_pull_round_trip() {
        let remote = MockRemote::new();
        let a = MockVsAdapter::with_remote(remote.clone());
        let b = MockVsAdapter::with_remote(remote);

        a.seed_row(
            "documents",
            "d1",
            HashMap::from([("content_hash".to_string(), Value::String("h1".into()))]),
        );
        a.add_all().await.unwrap();
        a.commit("add d1").await.unwrap();
        a.push("origin", "main").await.unwrap();

        let outcome = b.pull("origin", "main").await.unwrap();
        assert!(outcome.success);
        assert!(outcome.fast_forward);
        assert_eq!(b.head_commit().await.unwrap(), a.head_commit().await.unwrap());
    }

    #[tokio::test]
    async fn diff_detects_added_and_removed_rows() {
        let vs = MockVsAdapter::new();
        vs.add_all().await.unwrap();
        let c1 = vs.commit("empty").await.unwrap();
        vs.seed_row(
            "documents",
            "d1",
            HashMap::from([("content_hash".to_string(), Value::String("h1".into()))]),
        );
        vs.add_all().await.unwrap();
        let c2 = vs.commit("add d1").await.unwrap();

        let rows = vs.diff(&c1, &c2, "documents").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, DiffKind::Added);
        assert_eq!(rows[0].id, "d1");
    }

    #[tokio::test]
    async fn is_ancestor_detects_lineage() {
        let vs = MockVsAdapter::new();
        vs.add_all().await.unwrap();
        let c1 = vs.commit("c1").await.unwrap();
        vs.add_all().await.unwrap();
        let c2 = vs.commit("c2").await.unwrap();
        assert!(vs.is_ancestor(&c1, &c2).await.unwrap());
        assert!(!vs.is_ancestor(&c2, &c1).await.unwrap());
    }
}
