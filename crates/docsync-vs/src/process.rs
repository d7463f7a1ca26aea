//! Subprocess invocation of the external version-store CLI.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use docsync_core::error::{Result, SyncError};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Captured result of running the CLI once.
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Run `executable args...` in `cwd`, optionally feeding `stdin`, bounded by
/// `timeout`. A timeout is reported identically to any other executable
/// failure and never leaves the child process running.
pub async fn run(
    executable: &str,
    args: &[&str],
    cwd: &Path,
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let mut cmd = Command::new(executable);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let start = std::time::Instant::now();
    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SyncError::ExecutableNotFound {
                path: executable.to_string(),
            }
        } else {
            SyncError::Io(e)
        }
    })?;

    if let Some(input) = stdin {
        if let Some(mut child_stdin) = child.stdin.take() {
            child_stdin.write_all(input.as_bytes()).await?;
        }
    } else {
        drop(child.stdin.take());
    }

    let wait = tokio::time::timeout(timeout, child.wait_with_output()).await;
    let output = match wait {
        Ok(result) => result?,
        Err(_) => {
            return Err(SyncError::executable_failure(format!(
                "{executable} {args:?} timed out after {timeout:?}"
            )));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    debug!(
        executable,
        ?args,
        success = output.status.success(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "vs command finished"
    );

    Ok(CommandOutput {
        success: output.status.success(),
        stdout,
        stderr,
    })
}

/// Map a failed command's stderr to a specific `SyncError` when a known
/// pattern is recognized, falling back to a generic `ExecutableFailure`.
pub fn classify_failure(stderr: &str) -> SyncError {
    let lower = stderr.to_lowercase();
    if lower.contains("empty repository") || lower.contains("does not have any commits") {
        SyncError::EmptyRepository
    } else if lower.contains("remote") && (lower.contains("not found") || lower.contains("does not exist")) {
        SyncError::RemoteNotFound {
            name: extract_remote_name(&lower).unwrap_or_else(|| "unknown".to_string()),
        }
    } else if lower.contains("authentication") || lower.contains("permission denied") || lower.contains("could not read username") {
        SyncError::RemoteAuthFailed
    } else if lower.contains("uncommitted") || lower.contains("working tree") {
        SyncError::UncommittedChanges {
            detail: stderr.trim().to_string(),
        }
    } else if lower.contains("conflict") {
        SyncError::Conflicts {
            table: "unknown".to_string(),
            rows: vec![stderr.trim().to_string()],
        }
    } else {
        SyncError::executable_failure(stderr.trim().to_string())
    }
}

fn extract_remote_name(lower: &str) -> Option<String> {
    lower
        .split_whitespace()
        .find(|w| !w.contains(':') && *w != "remote")
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_empty_repository() {
        let err = classify_failure("fatal: this repository is empty, does not have any commits yet");
        assert_eq!(err.error_code(), "EMPTY_REPOSITORY");
    }

    #[test]
    fn classifies_auth_failure() {
        let err = classify_failure("fatal: Authentication failed for 'https://example/repo'");
        assert_eq!(err.error_code(), "REMOTE_AUTH_FAILED");
    }

    #[test]
    fn falls_back_to_generic_failure() {
        let err = classify_failure("something completely unexpected happened");
        assert_eq!(err.error_code(), "EXECUTABLE_FAILURE");
    }
}
