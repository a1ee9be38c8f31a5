//! Durable, size-bounded processing catalog.
//!
//! The catalog is a JSON snapshot of the most recent processed items,
//! newest first, capped at a fixed entry count. It lives in a versioned
//! remote store (git in production) and is re-synced before every read
//! and write so concurrent deployments converge on the remote copy.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use clipvault_shared::{CatalogConfig, CatalogEntry, Result, short_title};

pub mod git;

pub use git::GitRemote;

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Versioned storage the snapshot file lives in.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Bring the local checkout up to date with the remote.
    async fn sync(&self) -> Result<()>;

    /// Stage `paths`, commit with `message` when anything changed, and
    /// push. Returns `false` when the snapshot was unchanged.
    async fn commit_and_push(&self, paths: &[PathBuf], message: &str) -> Result<bool>;
}

/// Read/record interface the pipeline uses.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Load the current catalog, newest first.
    async fn load(&self) -> Result<Vec<CatalogEntry>>;

    /// Record one completed item and publish the updated snapshot.
    async fn save(&self, entry: CatalogEntry) -> Result<SaveOutcome>;
}

/// What happened to a recorded entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Snapshot changed, committed, and pushed to the remote.
    Pushed,
    /// Snapshot was byte-identical to the stored one; nothing published.
    Unchanged,
    /// Snapshot written to the local checkout but publishing failed.
    /// The next successful save will carry it along.
    LocalOnly,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Snapshot store over a [`RemoteStore`].
pub struct CatalogStore<R> {
    remote: R,
    checkout_dir: PathBuf,
    snapshot_file: String,
    max_entries: usize,
}

impl<R: RemoteStore> CatalogStore<R> {
    pub fn new(remote: R, config: &CatalogConfig) -> Self {
        Self {
            remote,
            checkout_dir: PathBuf::from(&config.checkout_dir),
            snapshot_file: config.snapshot_file.clone(),
            max_entries: config.max_entries,
        }
    }

    fn snapshot_path(&self) -> PathBuf {
        self.checkout_dir.join(&self.snapshot_file)
    }

    /// Parse the snapshot in the (already synced) checkout. A missing
    /// or malformed file reads as an empty catalog rather than an error.
    fn read_snapshot(&self) -> Vec<CatalogEntry> {
        let path = self.snapshot_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => {
                warn!(path = %path.display(), "no catalog snapshot; starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed catalog snapshot; starting empty");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl<R: RemoteStore> Catalog for CatalogStore<R> {
    #[instrument(skip_all)]
    async fn load(&self) -> Result<Vec<CatalogEntry>> {
        self.remote.sync().await?;
        Ok(self.read_snapshot())
    }

    #[instrument(skip_all, fields(item_id = %entry.id))]
    async fn save(&self, entry: CatalogEntry) -> Result<SaveOutcome> {
        // Re-sync and re-read so the update applies to the freshest
        // remote state, not a snapshot loaded at job start.
        self.remote.sync().await?;
        let mut entries = self.read_snapshot();

        let message = format!(
            "catalog: add {} ({})",
            entry.id,
            short_title(&entry.title, 50)
        );

        // Newest first: replace any previous record of the same item,
        // prepend, and evict from the tail.
        entries.retain(|e| e.id != entry.id);
        entries.insert(0, entry);
        entries.truncate(self.max_entries);

        let path = self.snapshot_path();
        let json = serde_json::to_string_pretty(&entries)
            .map_err(|e| clipvault_shared::ClipvaultError::catalog(e.to_string()))?;
        std::fs::write(&path, json)
            .map_err(|e| clipvault_shared::ClipvaultError::io(&path, e))?;

        match self
            .remote
            .commit_and_push(&[PathBuf::from(&self.snapshot_file)], &message)
            .await
        {
            Ok(true) => {
                info!(entries = entries.len(), "catalog snapshot published");
                Ok(SaveOutcome::Pushed)
            }
            Ok(false) => Ok(SaveOutcome::Unchanged),
            Err(e) => {
                // The local write already succeeded; losing the push is
                // recoverable and must not fail the job.
                warn!(error = %e, "catalog push failed; keeping local snapshot");
                Ok(SaveOutcome::LocalOnly)
            }
        }
    }
}
