//! Git operations module.
//!
//! Applies model-generated unified diffs to the working tree with
//! `git apply --whitespace=fix`. Commands are executed asynchronously via
//! `tokio::process::Command`. Failures are returned as [`ApplyOutcome`]
//! values rather than errors: a patch that does not apply is an expected
//! outcome of the improve loop, not a reason to stop it.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt as _;
use tracing::{debug, instrument, warn};

/// Result of applying a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// `git apply` accepted the patch.
    Applied,
    /// The patch was rejected or git could not be run.
    Failed(String),
}

/// Git operations for a project working tree.
#[derive(Debug, Clone)]
pub struct GitOps {
    /// Working tree root; patches are applied relative to it.
    repo_path: PathBuf,
}

impl GitOps {
    /// Create a new `GitOps` instance.
    pub fn new(repo_path: PathBuf) -> Self {
        Self { repo_path }
    }

    /// Returns the working tree root.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Apply a unified diff to the working tree.
    ///
    /// Runs `git apply --whitespace=fix` in the working tree root with the
    /// patch on stdin. There is no retry and no rollback: whatever git
    /// leaves behind on failure stays in the tree.
    #[instrument(skip(self, patch), fields(bytes = patch.len()))]
    pub async fn apply_patch(&self, patch: &str) -> ApplyOutcome {
        let mut input = patch.to_owned();
        // git rejects a final hunk line without its newline as a corrupt patch.
        if !input.ends_with('\n') {
            input.push('\n');
        }

        let mut child = match tokio::process::Command::new("git")
            .args(["apply", "--whitespace=fix"])
            .current_dir(&self.repo_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "failed to spawn git apply");
                return ApplyOutcome::Failed(format!("could not run git: {e}"));
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                // git may exit before reading everything; its stderr says why.
                debug!(error = %e, "failed writing patch to git apply");
            }
        }

        let output = match child.wait_with_output().await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "git apply did not complete");
                return ApplyOutcome::Failed(format!("git apply did not complete: {e}"));
            }
        };

        if output.status.success() {
            debug!("patch applied");
            ApplyOutcome::Applied
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            warn!(exit_code = ?output.status.code(), stderr = %stderr, "git apply failed");
            ApplyOutcome::Failed(if stderr.is_empty() {
                format!("git apply exited with {}", output.status)
            } else {
                stderr
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const PATCH: &str = "--- a/hello.py\n+++ b/hello.py\n@@ -1 +1 @@\n-print('old')\n+print('new')\n";

    #[tokio::test]
    async fn test_should_apply_patch_to_working_tree() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        fs::write(dir.path().join("hello.py"), "print('old')\n").expect("should write file");

        let ops = GitOps::new(dir.path().to_path_buf());
        let outcome = ops.apply_patch(PATCH).await;

        assert_eq!(outcome, ApplyOutcome::Applied);
        let content = fs::read_to_string(dir.path().join("hello.py")).expect("should read");
        assert_eq!(content, "print('new')\n");
    }

    #[tokio::test]
    async fn test_should_accept_patch_without_trailing_newline() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        fs::write(dir.path().join("hello.py"), "print('old')\n").expect("should write file");

        let ops = GitOps::new(dir.path().to_path_buf());
        let outcome = ops.apply_patch(PATCH.trim_end()).await;

        assert_eq!(outcome, ApplyOutcome::Applied);
    }

    #[tokio::test]
    async fn test_should_report_failure_for_garbage_patch() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        fs::write(dir.path().join("hello.py"), "print('old')\n").expect("should write file");

        let ops = GitOps::new(dir.path().to_path_buf());
        let outcome = ops.apply_patch("this is not a diff").await;

        assert!(matches!(outcome, ApplyOutcome::Failed(_)));
        let content = fs::read_to_string(dir.path().join("hello.py")).expect("should read");
        assert_eq!(content, "print('old')\n");
    }

    #[tokio::test]
    async fn test_should_report_failure_for_missing_working_tree() {
        let ops = GitOps::new(PathBuf::from("/nonexistent/skye-tree"));
        let outcome = ops.apply_patch(PATCH).await;
        assert!(matches!(outcome, ApplyOutcome::Failed(_)));
    }
}
