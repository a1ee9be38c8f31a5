//! End-to-end processing pipeline: item → download → segment → upload → catalog.
//!
//! The orchestrator owns the stage order and the failure policy: any
//! stage error aborts the job with no retry, already-uploaded chunk
//! references are discarded, the workspace is purged best-effort, and
//! the job lock is always released. The catalog only ever records
//! complete items.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use clipvault_catalog::{Catalog, SaveOutcome};
use clipvault_media::{Downloader, Segmenter};
use clipvault_shared::{
    CatalogEntry, ClipvaultError, FeedItem, JobId, Part, PipelineConfig, Result, short_title,
};
use clipvault_sink::Sink;

use crate::job::{Job, JobGuard, JobLock, JobStage};
use crate::status::{StatusReporter, report};

// ---------------------------------------------------------------------------
// Stage seams
// ---------------------------------------------------------------------------

/// Retrieves the full-length source media for one item.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, item_id: &str, workspace: &Path) -> Result<PathBuf>;
}

#[async_trait]
impl Fetcher for Downloader {
    async fn fetch(&self, item_id: &str, workspace: &Path) -> Result<PathBuf> {
        Downloader::fetch(self, item_id, workspace).await
    }
}

/// Splits retrieved media into ordered fixed-duration chunks.
#[async_trait]
pub trait Splitter: Send + Sync {
    async fn split(
        &self,
        input: &Path,
        chunk_seconds: u32,
        workspace: &Path,
    ) -> Result<Vec<PathBuf>>;
}

#[async_trait]
impl Splitter for Segmenter {
    async fn split(
        &self,
        input: &Path,
        chunk_seconds: u32,
        workspace: &Path,
    ) -> Result<Vec<PathBuf>> {
        Segmenter::split(self, input, chunk_seconds, workspace).await
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Outcome of one successful pipeline run.
#[derive(Debug)]
pub struct RunReport {
    pub job_id: JobId,
    pub item: FeedItem,
    /// Number of chunks uploaded and recorded.
    pub parts: usize,
    /// What the catalog did with the new entry.
    pub outcome: SaveOutcome,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

/// Drives one item through every pipeline stage under the job lock.
pub struct Orchestrator {
    lock: JobLock,
    fetcher: Arc<dyn Fetcher>,
    splitter: Arc<dyn Splitter>,
    sink: Arc<dyn Sink>,
    catalog: Arc<dyn Catalog>,
    reporter: Arc<dyn StatusReporter>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        splitter: Arc<dyn Splitter>,
        sink: Arc<dyn Sink>,
        catalog: Arc<dyn Catalog>,
        reporter: Arc<dyn StatusReporter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            // The lockfile lives next to the job workspaces, so separate
            // invocations sharing a workspace share the job slot too.
            lock: JobLock::with_path(config.workspace_root.join("job.lock")),
            fetcher,
            splitter,
            sink,
            catalog,
            reporter,
            config,
        }
    }

    /// The shared job lock, for status queries.
    pub fn lock(&self) -> &JobLock {
        &self.lock
    }

    /// Process one item end to end.
    ///
    /// Fails fast with [`ClipvaultError::Busy`] when a job is already
    /// running, before any side effects. There is no retry at this
    /// level: a failed item stays absent from the catalog and becomes
    /// eligible again on the next scan.
    #[instrument(skip_all, fields(item_id = %item.id))]
    pub async fn run(&self, item: FeedItem) -> Result<RunReport> {
        let guard = self.lock.try_acquire()?;

        let mut job = Job::new(item, PathBuf::new());
        job.workspace = self.config.workspace_root.join(job.id.to_string());

        info!(job_id = %job.id, title = %job.item.title, "job started");
        job.message = self
            .reporter
            .open(&format!(
                "Processing: {}",
                short_title(&job.item.title, 50)
            ))
            .await;

        let result = self.run_stages(&guard, &mut job).await;

        // Purge intermediate files whether the job succeeded or not.
        if job.workspace.exists() {
            if let Err(e) = std::fs::remove_dir_all(&job.workspace) {
                warn!(workspace = %job.workspace.display(), error = %e, "workspace purge failed");
            }
        }

        match &result {
            Ok(run) => info!(job_id = %job.id, parts = run.parts, "job complete"),
            Err(e) => {
                report(self.reporter.as_ref(), &mut job, format!("Failed: {e}")).await;
            }
        }

        drop(guard);
        result
    }

    async fn run_stages(&self, guard: &JobGuard, job: &mut Job) -> Result<RunReport> {
        std::fs::create_dir_all(&job.workspace)
            .map_err(|e| ClipvaultError::io(&job.workspace, e))?;

        guard.set_stage(JobStage::Download);
        report(self.reporter.as_ref(), job, "Downloading source media...").await;
        let input = self.fetcher.fetch(&job.item.id, &job.workspace).await?;

        guard.set_stage(JobStage::Segment);
        report(
            self.reporter.as_ref(),
            job,
            format!("Splitting into {}s parts...", self.config.chunk_seconds),
        )
        .await;
        let chunks = self
            .splitter
            .split(&input, self.config.chunk_seconds, &job.workspace)
            .await?;

        guard.set_stage(JobStage::Upload);
        let total = chunks.len();
        let mut parts = Vec::with_capacity(total);
        for (i, chunk) in chunks.iter().enumerate() {
            let part_num = (i + 1) as u32;
            let caption = format!("{} - Part {}", job.item.title, part_num);
            let file_id = self
                .sink
                .upload(chunk, &caption, self.config.upload_timeout)
                .await?;

            // The local copy goes only once the sink has confirmed it.
            if let Err(e) = std::fs::remove_file(chunk) {
                warn!(chunk = %chunk.display(), error = %e, "failed to delete uploaded chunk");
            }

            parts.push(Part { part_num, file_id });
            report(
                self.reporter.as_ref(),
                job,
                format!("Uploaded part {part_num}/{total}"),
            )
            .await;
        }

        guard.set_stage(JobStage::Record);
        let entry = CatalogEntry {
            id: job.item.id.clone(),
            title: job.item.title.clone(),
            parts,
        };
        let outcome = self.catalog.save(entry).await?;
        if outcome == SaveOutcome::LocalOnly {
            report(
                self.reporter.as_ref(),
                job,
                "Catalog updated locally; remote push failed",
            )
            .await;
        }

        report(
            self.reporter.as_ref(),
            job,
            format!("Done: {total} parts uploaded"),
        )
        .await;

        Ok(RunReport {
            job_id: job.id.clone(),
            item: job.item.clone(),
            parts: total,
            outcome,
            elapsed: job.started_at.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::status::{SilentStatus, StatusMessage};

    // -- fakes ---------------------------------------------------------------

    struct FakeFetcher {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl Default for FakeFetcher {
        fn default() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, item_id: &str, workspace: &Path) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ClipvaultError::download("retriever exploded"));
            }
            let path = workspace.join(format!("{item_id}_full.mp4"));
            std::fs::write(&path, b"full").unwrap();
            Ok(path)
        }
    }

    struct FakeSplitter {
        chunks: usize,
    }

    #[async_trait]
    impl Splitter for FakeSplitter {
        async fn split(
            &self,
            input: &Path,
            _chunk_seconds: u32,
            workspace: &Path,
        ) -> Result<Vec<PathBuf>> {
            std::fs::remove_file(input).unwrap();
            let mut out = Vec::new();
            for i in 0..self.chunks {
                let path = workspace.join(format!("vid_part_{i:03}.mp4"));
                std::fs::write(&path, b"chunk").unwrap();
                out.push(path);
            }
            Ok(out)
        }
    }

    #[derive(Default)]
    struct FakeSink {
        captions: Mutex<Vec<String>>,
        /// (chunk existed at upload time, previous chunk already gone)
        observations: Mutex<Vec<(bool, bool)>>,
        previous: Mutex<Option<PathBuf>>,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl Sink for FakeSink {
        async fn upload(&self, chunk: &Path, caption: &str, _timeout: Duration) -> Result<String> {
            let call = {
                let mut captions = self.captions.lock().unwrap();
                captions.push(caption.to_string());
                captions.len()
            };

            let prev_gone = self
                .previous
                .lock()
                .unwrap()
                .as_ref()
                .map(|p| !p.exists())
                .unwrap_or(true);
            self.observations
                .lock()
                .unwrap()
                .push((chunk.exists(), prev_gone));
            *self.previous.lock().unwrap() = Some(chunk.to_path_buf());

            if self.fail_at == Some(call) {
                return Err(ClipvaultError::upload("sink said no"));
            }
            Ok(format!("ref-{call}"))
        }
    }

    #[derive(Default)]
    struct FakeCatalog {
        saved: Mutex<Vec<CatalogEntry>>,
    }

    #[async_trait]
    impl Catalog for FakeCatalog {
        async fn load(&self) -> Result<Vec<CatalogEntry>> {
            Ok(self.saved.lock().unwrap().clone())
        }

        async fn save(&self, entry: CatalogEntry) -> Result<SaveOutcome> {
            self.saved.lock().unwrap().push(entry);
            Ok(SaveOutcome::Pushed)
        }
    }

    struct RecordingReporter {
        rendered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StatusReporter for RecordingReporter {
        async fn open(&self, _text: &str) -> Option<StatusMessage> {
            Some(StatusMessage { id: "m".into() })
        }

        async fn render(&self, _message: &StatusMessage, text: &str) {
            self.rendered.lock().unwrap().push(text.to_string());
        }
    }

    // -- harness -------------------------------------------------------------

    struct Harness {
        orchestrator: Orchestrator,
        sink: Arc<FakeSink>,
        catalog: Arc<FakeCatalog>,
        fetcher: Arc<FakeFetcher>,
        workspace_root: PathBuf,
        _dir: tempfile::TempDir,
    }

    fn harness(fetcher: FakeFetcher, chunks: usize, sink: FakeSink) -> Harness {
        harness_with_reporter(fetcher, chunks, sink, Arc::new(SilentStatus))
    }

    fn harness_with_reporter(
        fetcher: FakeFetcher,
        chunks: usize,
        sink: FakeSink,
        reporter: Arc<dyn StatusReporter>,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let workspace_root = dir.path().join("work");
        let fetcher = Arc::new(fetcher);
        let sink = Arc::new(sink);
        let catalog = Arc::new(FakeCatalog::default());
        let orchestrator = Orchestrator::new(
            fetcher.clone(),
            Arc::new(FakeSplitter { chunks }),
            sink.clone(),
            catalog.clone(),
            reporter,
            PipelineConfig {
                workspace_root: workspace_root.clone(),
                chunk_seconds: 240,
                upload_timeout: Duration::from_secs(5),
            },
        );
        Harness {
            orchestrator,
            sink,
            catalog,
            fetcher,
            workspace_root,
            _dir: dir,
        }
    }

    fn item() -> FeedItem {
        FeedItem {
            id: "vid01".into(),
            title: "My Title".into(),
        }
    }

    // -- tests ---------------------------------------------------------------

    #[tokio::test]
    async fn full_run_uploads_in_order_and_records_once() {
        let h = harness(FakeFetcher::default(), 3, FakeSink::default());

        let run = h.orchestrator.run(item()).await.expect("run");
        assert_eq!(run.parts, 3);
        assert_eq!(run.outcome, SaveOutcome::Pushed);

        let captions = h.sink.captions.lock().unwrap().clone();
        assert_eq!(
            captions,
            vec![
                "My Title - Part 1",
                "My Title - Part 2",
                "My Title - Part 3"
            ]
        );

        let saved = h.catalog.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, "vid01");
        let nums: Vec<u32> = saved[0].parts.iter().map(|p| p.part_num).collect();
        assert_eq!(nums, vec![1, 2, 3]);

        // Workspace is purged and the lock is free again.
        assert!(!h.workspace_root.join(run.job_id.to_string()).exists());
        assert!(!h.orchestrator.lock().is_busy());
    }

    #[tokio::test]
    async fn concurrent_trigger_is_rejected_while_busy() {
        let h = Arc::new(harness(
            FakeFetcher {
                delay: Duration::from_millis(200),
                ..Default::default()
            },
            1,
            FakeSink::default(),
        ));

        let first = {
            let h = h.clone();
            tokio::spawn(async move { h.orchestrator.run(item()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = h.orchestrator.run(item()).await.unwrap_err();
        assert!(matches!(err, ClipvaultError::Busy));

        first.await.unwrap().expect("first run");
        assert!(!h.orchestrator.lock().is_busy());
    }

    #[tokio::test]
    async fn upload_failure_discards_refs_and_never_records() {
        let h = harness(
            FakeFetcher::default(),
            3,
            FakeSink {
                fail_at: Some(2),
                ..Default::default()
            },
        );

        let err = h.orchestrator.run(item()).await.unwrap_err();
        assert!(matches!(err, ClipvaultError::Upload(_)));

        // Nothing partial reaches the catalog; the item stays pending.
        assert!(h.catalog.saved.lock().unwrap().is_empty());
        assert!(!h.orchestrator.lock().is_busy());
        // Intermediate files are gone despite the failure.
        assert!(
            !h.workspace_root.exists()
                || std::fs::read_dir(&h.workspace_root).unwrap().count() == 0
        );
    }

    #[tokio::test]
    async fn download_failure_is_reported_and_not_retried() {
        let reporter = Arc::new(RecordingReporter {
            rendered: Mutex::new(Vec::new()),
        });
        let h = harness_with_reporter(
            FakeFetcher {
                fail: true,
                ..Default::default()
            },
            1,
            FakeSink::default(),
            reporter.clone(),
        );

        let err = h.orchestrator.run(item()).await.unwrap_err();
        assert!(matches!(err, ClipvaultError::Download(_)));
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(!h.orchestrator.lock().is_busy());

        let rendered = reporter.rendered.lock().unwrap();
        assert!(rendered.last().unwrap().contains("Failed: download error"));
    }

    #[tokio::test]
    async fn chunk_deleted_only_after_confirmed_upload() {
        let h = harness(FakeFetcher::default(), 3, FakeSink::default());
        h.orchestrator.run(item()).await.expect("run");

        let observations = h.sink.observations.lock().unwrap();
        for &(existed, prev_gone) in observations.iter() {
            // Every chunk still exists when offered to the sink, and its
            // predecessor has already been deleted.
            assert!(existed);
            assert!(prev_gone);
        }
    }
}
