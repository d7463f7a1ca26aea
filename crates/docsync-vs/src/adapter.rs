//! Subprocess-backed implementation of the `VsAdapter` capability set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use docsync_core::error::{Result, SyncError};
use docsync_core::traits::{
    ConflictResolution, ConflictRow, DiffKind, DiffRow, MergeOutcome, PullOutcome, VsAdapter,
    VsBranch, VsCommit, VsStatus,
};
use serde_json::Value;
use tracing::{info, instrument};

use crate::process::{classify_failure, run};

/// Adapter that drives the external version-store CLI as a subprocess,
/// requesting machine-readable output wherever the operation returns
/// structured rows.
pub struct CliVsAdapter {
    executable_path: String,
    effective_path: PathBuf,
    timeout: Duration,
}

impl CliVsAdapter {
    pub fn new(executable_path: impl Into<String>, repository_path: impl Into<PathBuf>, timeout_ms: u64) -> Self {
        Self {
            executable_path: executable_path.into(),
            effective_path: repository_path.into(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Point the adapter at a different effective path, used by path
    /// alignment once the real repository location has been discovered.
    pub fn with_effective_path(mut self, path: PathBuf) -> Self {
        self.effective_path = path;
        self
    }

    async fn run_ok(&self, args: &[&str]) -> Result<String> {
        self.run_ok_stdin(args, None).await
    }

    async fn run_ok_stdin(&self, args: &[&str], stdin: Option<&str>) -> Result<String> {
        let output = run(
            &self.executable_path,
            args,
            &self.effective_path,
            stdin,
            self.timeout,
        )
        .await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(classify_failure(&output.stderr))
        }
    }

    fn parse_json(stdout: &str) -> Result<Value> {
        serde_json::from_str(stdout.trim())
            .map_err(|e| SyncError::executable_failure(format!("could not parse vs output as json: {e}")))
    }
}

#[async_trait]
impl VsAdapter for CliVsAdapter {
    #[instrument(skip(self), fields(repository = %self.effective_path.display()))]
    async fn init(&self) -> Result<()> {
        self.run_ok(&["init"]).await?;
        info!("initialized version store");
        Ok(())
    }

    async fn clone_repo(&self, remote_url: &str) -> Result<()> {
        if let Some(parent) = self.effective_path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        self.run_ok(&["clone", remote_url, "."]).await?;
        Ok(())
    }

    async fn status(&self) -> Result<VsStatus> {
        let stdout = self.run_ok(&["--json", "status"]).await?;
        let value = Self::parse_json(&stdout)?;
        let branch = value
            .get("branch")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let staged = value
            .get("staged")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let modified = value
            .get("modified")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        Ok(VsStatus { branch, staged, modified })
    }

    async fn current_branch(&self) -> Result<String> {
        Ok(self.status().await?.branch)
    }

    async fn head_commit(&self) -> Result<Option<String>> {
        let output = run(
            &self.executable_path,
            &["--json", "rev-parse", "HEAD"],
            &self.effective_path,
            None,
            self.timeout,
        )
        .await?;
        if !output.success {
            let err = classify_failure(&output.stderr);
            return match err {
                SyncError::EmptyRepository => Ok(None),
                other => Err(other),
            };
        }
        Ok(Some(output.stdout.trim().to_string()))
    }

    async fn list_branches(&self) -> Result<Vec<VsBranch>> {
        let stdout = self.run_ok(&["--json", "branch", "--list"]).await?;
        let value = Self::parse_json(&stdout)?;
        let rows = value.as_array().cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(VsBranch {
                    name: row.get("name")?.as_str()?.to_string(),
                    is_current: row.get("current").and_then(Value::as_bool).unwrap_or(false),
                    head_commit: row.get("head")?.as_str()?.to_string(),
                })
            })
            .collect())
    }

    async fn create_branch(&self, name: &str) -> Result<()> {
        self.run_ok(&["branch", name]).await?;
        Ok(())
    }

    async fn checkout(&self, reference: &str, create: bool) -> Result<()> {
        if create {
            self.run_ok(&["checkout", "-b", reference]).await?;
        } else {
            self.run_ok(&["checkout", reference]).await?;
        }
        Ok(())
    }

    async fn add_all(&self) -> Result<()> {
        self.run_ok(&["add", "-A"]).await?;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<String> {
        self.run_ok(&["commit", "-m", message]).await?;
        self.head_commit().await?.ok_or_else(|| SyncError::EmptyRepository)
    }

    async fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.run_ok(&["push", remote, branch]).await?;
        Ok(())
    }

    async fn pull(&self, remote: &str, branch: &str) -> Result<PullOutcome> {
        let old_head = self.head_commit().await?;
        let output = run(
            &self.executable_path,
            &["--json", "pull", remote, branch],
            &self.effective_path,
            None,
            self.timeout,
        )
        .await?;

        if !output.success {
            let err = classify_failure(&output.stderr);
            if matches!(err, SyncError::Conflicts { .. }) {
                return Ok(PullOutcome {
                    success: false,
                    fast_forward: false,
                    had_conflicts: true,
                    old_head,
                    new_head: None,
                });
            }
            return Err(err);
        }

        let new_head = self.head_commit().await?;
        let fast_forward = old_head != new_head;
        Ok(PullOutcome {
            success: true,
            fast_forward,
            had_conflicts: false,
            old_head,
            new_head,
        })
    }

    async fn fetch(&self, remote: &str) -> Result<()> {
        self.run_ok(&["fetch", remote]).await?;
        Ok(())
    }

    async fn merge(&self, source_branch: &str) -> Result<MergeOutcome> {
        let output = run(
            &self.executable_path,
            &["--json", "merge", source_branch],
            &self.effective_path,
            None,
            self.timeout,
        )
        .await?;

        if !output.success {
            let err = classify_failure(&output.stderr);
            if matches!(err, SyncError::Conflicts { .. }) {
                return Ok(MergeOutcome {
                    success: false,
                    had_conflicts: true,
                    merge_commit: None,
                });
            }
            return Err(err);
        }

        let merge_commit = self.head_commit().await?;
        Ok(MergeOutcome {
            success: true,
            had_conflicts: false,
            merge_commit,
        })
    }

    async fn conflicts(&self, table: &str) -> Result<Vec<ConflictRow>> {
        let stdout = self.run_ok(&["--json", "conflicts", table]).await?;
        let value = Self::parse_json(&stdout)?;
        let rows = value.as_array().cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(ConflictRow {
                    table: table.to_string(),
                    row_id: row.get("id")?.as_str()?.to_string(),
                })
            })
            .collect())
    }

    async fn resolve(&self, table: &str, row_id: &str, side: ConflictResolution) -> Result<()> {
        let side_str = match side {
            ConflictResolution::Ours => "ours",
            ConflictResolution::Theirs => "theirs",
        };
        self.run_ok(&["resolve", table, row_id, side_str]).await?;
        Ok(())
    }

    async fn reset_hard(&self, reference: &str) -> Result<()> {
        self.run_ok(&["reset", "--hard", reference]).await?;
        Ok(())
    }

    async fn diff(&self, from: &str, to: &str, table: &str) -> Result<Vec<DiffRow>> {
        let stdout = self.run_ok(&["--json", "diff", from, to, table]).await?;
        let value = Self::parse_json(&stdout)?;
        let rows = value.as_array().cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let kind = match row.get("diff_type")?.as_str()? {
                    "added" => DiffKind::Added,
                    "modified" => DiffKind::Modified,
                    "removed" => DiffKind::Removed,
                    _ => return None,
                };
                Some(DiffRow {
                    kind,
                    id: row.get("id")?.as_str()?.to_string(),
                    from_hash: row.get("from_hash").and_then(Value::as_str).map(str::to_string),
                    to_hash: row.get("to_hash").and_then(Value::as_str).map(str::to_string),
                    to_content: row.get("to_content").and_then(Value::as_str).map(str::to_string),
                })
            })
            .collect())
    }

    async fn log(&self, limit: usize) -> Result<Vec<VsCommit>> {
        let limit_str = limit.to_string();
        let stdout = self.run_ok(&["--json", "log", "--limit", &limit_str]).await?;
        let value = Self::parse_json(&stdout)?;
        let rows = value.as_array().cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(VsCommit {
                    hash: row.get("hash")?.as_str()?.to_string(),
                    message: row.get("message")?.as_str()?.to_string(),
                    author: row.get("author")?.as_str()?.to_string(),
                    timestamp: row.get("timestamp")?.as_i64()?,
                })
            })
            .collect())
    }

    async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let output = run(
            &self.executable_path,
            &["merge-base", "--is-ancestor", ancestor, descendant],
            &self.effective_path,
            None,
            self.timeout,
        )
        .await?;
        Ok(output.success)
    }

    async fn exec(&self, sql: &str) -> Result<u64> {
        let stdout = self.run_ok_stdin(&["--json", "exec", "-"], Some(sql)).await?;
        let value = Self::parse_json(&stdout)?;
        Ok(value.get("rows_affected").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn query_json(&self, sql: &str) -> Result<Vec<Value>> {
        let stdout = self.run_ok_stdin(&["--json", "query", "-"], Some(sql)).await?;
        let value = Self::parse_json(&stdout)?;
        Ok(value.as_array().cloned().unwrap_or_default())
    }

    fn effective_path(&self) -> &Path {
        &self.effective_path
    }
}
