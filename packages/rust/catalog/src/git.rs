//! Git-backed remote store.
//!
//! The catalog snapshot lives in a git repository. Sync is
//! clone-or-pull into a local checkout; publishing stages the snapshot,
//! commits only when the staged diff is non-empty, and pushes. All git
//! operations run the system `git` binary as a subprocess.

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use clipvault_shared::{ClipvaultError, Result};

use crate::RemoteStore;

/// Commit author identity used for catalog updates.
const AUTHOR_NAME: &str = "clipvault";
const AUTHOR_EMAIL: &str = "clipvault@localhost";

/// Remote store backed by a git repository over https (or a local path
/// in tests).
pub struct GitRemote {
    remote_url: String,
    checkout_dir: PathBuf,
    token: Option<String>,
}

impl GitRemote {
    /// Create a remote for `remote_url`, checked out at `checkout_dir`.
    ///
    /// When `token` is set it is injected into the https remote URL for
    /// authentication; it never appears in config files or errors.
    pub fn new(
        remote_url: impl Into<String>,
        checkout_dir: impl Into<PathBuf>,
        token: Option<String>,
    ) -> Self {
        Self {
            remote_url: remote_url.into(),
            checkout_dir: checkout_dir.into(),
            token,
        }
    }

    /// The remote URL with the auth token injected, if any.
    fn authenticated_url(&self) -> String {
        match &self.token {
            Some(token) if self.remote_url.starts_with("https://") => {
                format!("https://{token}@{}", &self.remote_url["https://".len()..])
            }
            _ => self.remote_url.clone(),
        }
    }

    /// Strip the token from any text destined for logs or errors.
    fn redact(&self, text: &str) -> String {
        match &self.token {
            Some(token) if !token.is_empty() => text.replace(token.as_str(), "***"),
            _ => text.to_string(),
        }
    }

    /// Run git with `args` inside the checkout directory.
    async fn git(&self, args: &[&str]) -> Result<Output> {
        run_git(args, Some(&self.checkout_dir)).await
    }

    /// Run git with `args` and fail with a sync error on non-zero exit.
    async fn git_ok(&self, args: &[&str]) -> Result<()> {
        let output = self.git(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClipvaultError::catalog_sync(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or(""),
                self.redact(stderr.trim())
            )));
        }
        Ok(())
    }

    /// Whether the checkout has any commits yet.
    async fn has_head(&self) -> bool {
        matches!(
            self.git(&["rev-parse", "--verify", "HEAD"]).await,
            Ok(output) if output.status.success()
        )
    }

    async fn clone_fresh(&self) -> Result<()> {
        if let Some(parent) = self.checkout_dir.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ClipvaultError::io(parent, e))?;
        }

        let url = self.authenticated_url();
        let dest = self.checkout_dir.to_string_lossy().into_owned();
        let output = run_git(&["clone", &url, &dest], None).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClipvaultError::catalog_sync(format!(
                "git clone failed: {}",
                self.redact(stderr.trim())
            )));
        }

        self.git_ok(&["config", "user.name", AUTHOR_NAME]).await?;
        self.git_ok(&["config", "user.email", AUTHOR_EMAIL]).await?;
        info!(checkout = %self.checkout_dir.display(), "cloned catalog checkout");
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for GitRemote {
    #[instrument(skip_all, fields(checkout = %self.checkout_dir.display()))]
    async fn sync(&self) -> Result<()> {
        if !self.checkout_dir.join(".git").is_dir() {
            return self.clone_fresh().await;
        }

        // A clone of an empty remote has no commits and nothing to pull.
        if !self.has_head().await {
            debug!("checkout has no commits; skipping pull");
            return Ok(());
        }

        self.git_ok(&["pull", "--ff-only"]).await
    }

    #[instrument(skip_all)]
    async fn commit_and_push(&self, paths: &[PathBuf], message: &str) -> Result<bool> {
        for path in paths {
            let path = path.to_string_lossy();
            self.git_ok(&["add", path.as_ref()]).await?;
        }

        // Commit only when the staged diff is non-empty.
        let diff = self.git(&["diff", "--staged", "--quiet"]).await?;
        if diff.status.success() {
            debug!("snapshot unchanged; nothing to commit");
            return Ok(false);
        }

        self.git_ok(&["commit", "-m", message]).await?;
        self.git_ok(&["push", "-u", "origin", "HEAD"]).await?;
        info!(message, "catalog update pushed");
        Ok(true)
    }
}

/// Run the git binary with `args`, optionally inside `cwd`.
async fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<Output> {
    let mut command = Command::new("git");
    command.args(args).kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    command.output().await.map_err(|e| {
        ClipvaultError::catalog_sync(format!("failed to run git: {e}. Is it installed?"))
    })
}
