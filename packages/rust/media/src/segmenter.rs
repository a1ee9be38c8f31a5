//! Fixed-interval segmenting via the external `ffmpeg` program.
//!
//! Splits a full-length file into independently playable chunks with
//! deterministic zero-padded sequential names. The full-length input is
//! removed immediately after a successful split to bound disk usage,
//! regardless of what happens downstream.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, instrument};

use clipvault_shared::{ClipvaultError, Result, SegmentConfig};

/// Default external transcoder program.
const DEFAULT_PROGRAM: &str = "ffmpeg";

/// Options controlling one segmenting invocation.
#[derive(Debug, Clone)]
pub struct SegmentOptions {
    /// Transcoder program name or path.
    pub program: String,
    /// Hard execution timeout.
    pub timeout: Duration,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.into(),
            timeout: Duration::from_secs(1800),
        }
    }
}

impl From<&SegmentConfig> for SegmentOptions {
    fn from(config: &SegmentConfig) -> Self {
        Self {
            program: DEFAULT_PROGRAM.into(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Splits retrieved media into ordered fixed-duration chunks.
pub struct Segmenter {
    opts: SegmentOptions,
}

impl Segmenter {
    pub fn new(opts: SegmentOptions) -> Self {
        Self { opts }
    }

    /// Split `input` into chunks of `chunk_seconds` inside `workspace`.
    ///
    /// Returns chunk paths sorted ascending by segment index. On
    /// success the input file is deleted before returning.
    #[instrument(skip_all, fields(input = %input.display(), chunk_seconds = chunk_seconds))]
    pub async fn split(
        &self,
        input: &Path,
        chunk_seconds: u32,
        workspace: &Path,
    ) -> Result<Vec<PathBuf>> {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ClipvaultError::segment("input file has no usable name"))?;
        // "<id>_full" -> "<id>"
        let prefix = stem.strip_suffix("_full").unwrap_or(stem).to_string();
        let template = workspace.join(format!("{prefix}_part_%03d.mp4"));

        // Timestamps reset per chunk so each part plays standalone.
        let output = tokio::time::timeout(
            self.opts.timeout,
            Command::new(&self.opts.program)
                .arg("-i")
                .arg(input)
                .args(["-c:v", "libx264", "-preset", "veryfast"])
                .args(["-c:a", "aac"])
                .args(["-map", "0"])
                .args(["-segment_time", &chunk_seconds.to_string()])
                .args(["-f", "segment"])
                .args(["-reset_timestamps", "1"])
                .args(["-movflags", "+faststart"])
                .arg(&template)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            ClipvaultError::segment(format!(
                "transcode timed out after {}s",
                self.opts.timeout.as_secs()
            ))
        })?
        .map_err(|e| {
            ClipvaultError::segment(format!(
                "failed to spawn {}: {e}. Is it installed?",
                self.opts.program
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClipvaultError::segment(format!(
                "{} exited with {}: {}",
                self.opts.program,
                output.status,
                crate::stderr_tail(&stderr, 300)
            )));
        }

        // Bound disk usage before anything else happens.
        std::fs::remove_file(input).map_err(|e| ClipvaultError::io(input, e))?;

        let chunks = collect_chunks(workspace, &format!("{prefix}_part_"))?;
        if chunks.is_empty() {
            return Err(ClipvaultError::segment("transcoder produced no chunks"));
        }

        info!(chunks = chunks.len(), "segmenting complete");
        Ok(chunks)
    }
}

/// Collect chunk files with the given prefix, sorted by name — the
/// zero-padded naming makes lexicographic order equal index order.
fn collect_chunks(workspace: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(workspace).map_err(|e| ClipvaultError::io(workspace, e))?;

    let mut chunks: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
        .collect();

    chunks.sort();
    Ok(chunks)
}
