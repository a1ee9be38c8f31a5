//! Single-flight job state.
//!
//! At most one job runs at a time. The [`JobLock`] hands out an RAII
//! [`JobGuard`] on acquisition; any second trigger while the guard
//! lives is rejected immediately, never queued. The guard releases the
//! lock on drop, including on panic and early return, so a failed job
//! can never wedge the pipeline.
//!
//! A lock created with [`JobLock::with_path`] also claims an exclusive
//! lockfile, so the busy state holds across separate short-lived
//! processes sharing a workspace, and `status` invocations can see a
//! job started elsewhere.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::warn;

use clipvault_shared::{ClipvaultError, FeedItem, JobId, Result};

use crate::status::StatusMessage;

/// Which stage the running job is in, for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Download,
    Segment,
    Upload,
    Record,
}

impl JobStage {
    fn name(self) -> &'static str {
        match self {
            JobStage::Download => "download",
            JobStage::Segment => "segment",
            JobStage::Upload => "upload",
            JobStage::Record => "record",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "download" => Some(JobStage::Download),
            "segment" => Some(JobStage::Segment),
            "upload" => Some(JobStage::Upload),
            "record" => Some(JobStage::Record),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One processing job: the item being worked on plus its accumulated
/// status history. Jobs live for a single pipeline run and are never
/// persisted.
pub struct Job {
    pub id: JobId,
    pub item: FeedItem,
    /// Scratch directory for this job's intermediate files.
    pub workspace: PathBuf,
    /// Open observer message, edited in place as the job progresses.
    pub message: Option<StatusMessage>,
    /// Status lines reported so far, oldest first.
    pub lines: Vec<String>,
    pub started_at: Instant,
}

impl Job {
    pub fn new(item: FeedItem, workspace: PathBuf) -> Self {
        Self {
            id: JobId::new(),
            item,
            workspace,
            message: None,
            lines: Vec::new(),
            started_at: Instant::now(),
        }
    }

    /// The full status text rendered to the observer.
    pub fn status_text(&self) -> String {
        self.lines.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Job lock
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LockState {
    busy: AtomicBool,
    stage: Mutex<Option<JobStage>>,
    /// Lockfile shared by every process using the same workspace.
    path: Option<PathBuf>,
}

impl LockState {
    fn stage(&self) -> Option<JobStage> {
        // A poisoned stage mutex only loses a status label.
        *self.stage.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_stage(&self, stage: Option<JobStage>) {
        *self.stage.lock().unwrap_or_else(|e| e.into_inner()) = stage;
    }
}

/// Exclusively create the lockfile. An existing file means another
/// process holds the slot.
fn claim_lockfile(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ClipvaultError::io(parent, e))?;
    }
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(ClipvaultError::Busy),
        Err(e) => Err(ClipvaultError::io(path, e)),
    }
}

/// Single-flight lock. Clones share the same state; locks built with
/// [`JobLock::with_path`] additionally share the slot with other
/// processes through a lockfile.
#[derive(Clone, Debug, Default)]
pub struct JobLock {
    inner: Arc<LockState>,
}

impl JobLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A lock whose busy state is also held on disk at `path`.
    ///
    /// A crashed process can leave the file behind; the slot then stays
    /// busy until the operator removes it.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            inner: Arc::new(LockState {
                busy: AtomicBool::new(false),
                stage: Mutex::new(None),
                path: Some(path),
            }),
        }
    }

    /// Acquire the lock, or fail with [`ClipvaultError::Busy`] when a
    /// job is already running. Rejected triggers are dropped, not queued.
    pub fn try_acquire(&self) -> Result<JobGuard> {
        if self
            .inner
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ClipvaultError::Busy);
        }

        if let Some(path) = self.inner.path.as_deref() {
            if let Err(e) = claim_lockfile(path) {
                self.inner.busy.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }

        Ok(JobGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn is_busy(&self) -> bool {
        if self.inner.busy.load(Ordering::SeqCst) {
            return true;
        }
        self.inner.path.as_deref().is_some_and(Path::exists)
    }

    /// Stage of the running job, if any. Falls back to the lockfile for
    /// jobs held by another process.
    pub fn current_stage(&self) -> Option<JobStage> {
        if let Some(stage) = self.inner.stage() {
            return Some(stage);
        }
        let path = self.inner.path.as_deref()?;
        let text = std::fs::read_to_string(path).ok()?;
        JobStage::from_name(text.trim())
    }
}

/// RAII guard over the single job slot.
#[derive(Debug)]
pub struct JobGuard {
    inner: Arc<LockState>,
}

impl JobGuard {
    /// Record which stage the job has entered.
    pub fn set_stage(&self, stage: JobStage) {
        self.inner.set_stage(Some(stage));
        if let Some(path) = self.inner.path.as_deref() {
            if let Err(e) = std::fs::write(path, stage.name()) {
                warn!(path = %path.display(), error = %e, "failed to record stage in lockfile");
            }
        }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.inner.set_stage(None);
        if let Some(path) = self.inner.path.as_deref() {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove lockfile");
                }
            }
        }
        self.inner.busy.store(false, Ordering::SeqCst);
    }
}
