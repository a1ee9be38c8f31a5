//! Error types for Clipvault.
//!
//! Library crates use [`ClipvaultError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Clipvault operations.
#[derive(Debug, thiserror::Error)]
pub enum ClipvaultError {
    /// A job is already running; the trigger is dropped, never queued.
    #[error("busy: a job is already running")]
    Busy,

    /// Media retrieval failed, timed out, or no working proxy was found.
    #[error("download error: {0}")]
    Download(String),

    /// Segmenting (transcode) failed or timed out.
    #[error("segment error: {0}")]
    Segment(String),

    /// The sink rejected a chunk or the upload timed out.
    #[error("upload error: {0}")]
    Upload(String),

    /// Remote catalog push failed. Non-fatal: the local snapshot stays
    /// authoritative until the next successful sync.
    #[error("catalog sync error: {0}")]
    CatalogSync(String),

    /// Local catalog read/write or remote checkout error.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Feed unreachable or malformed. Scanners treat this as zero new items.
    #[error("feed parse error: {0}")]
    FeedParse(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ClipvaultError>;

impl ClipvaultError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a download error from any displayable message.
    pub fn download(msg: impl Into<String>) -> Self {
        Self::Download(msg.into())
    }

    /// Create a segment error from any displayable message.
    pub fn segment(msg: impl Into<String>) -> Self {
        Self::Segment(msg.into())
    }

    /// Create an upload error from any displayable message.
    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    /// Create a catalog error from any displayable message.
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    /// Create a catalog sync error from any displayable message.
    pub fn catalog_sync(msg: impl Into<String>) -> Self {
        Self::CatalogSync(msg.into())
    }

    /// Create a feed parse error from any displayable message.
    pub fn feed(msg: impl Into<String>) -> Self {
        Self::FeedParse(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
