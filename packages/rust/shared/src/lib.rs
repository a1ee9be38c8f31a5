//! Shared types, error model, and configuration for Clipvault.
//!
//! This crate is the foundation depended on by all other Clipvault crates.
//! It provides:
//! - [`ClipvaultError`] — the unified error type
//! - Domain types ([`CatalogEntry`], [`Part`], [`FeedItem`], [`JobId`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CatalogConfig, DownloadConfig, FeedConfig, ObserverConfig, OperatorConfig,
    PipelineConfig, ProxyConfig, SegmentConfig, SinkConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, secret_from_env,
};
pub use error::{ClipvaultError, Result};
pub use types::{CatalogEntry, FeedItem, JobId, Part, short_title};
