//! Core orchestration for Clipvault.
//!
//! This crate ties feed scanning, media retrieval, segmenting, sink
//! uploads, and the catalog into the end-to-end single-flight pipeline,
//! and exposes the operator trigger surface on top of it.

pub mod job;
pub mod pipeline;
pub mod status;
pub mod trigger;

pub use job::{Job, JobGuard, JobLock, JobStage};
pub use pipeline::{Fetcher, Orchestrator, RunReport, Splitter};
pub use status::{ChatStatus, LogStatus, SilentStatus, StatusMessage, StatusReporter, report};
pub use trigger::{Action, FeedSource, Outcome, StatusSnapshot, TriggerSurface};
