//! Application configuration for Clipvault.
//!
//! User config lives at `~/.clipvault/clipvault.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file — only the names of the
//! environment variables that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClipvaultError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "clipvault.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".clipvault";

// ---------------------------------------------------------------------------
// Config structs (matching clipvault.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Feed source settings.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Download stage settings.
    #[serde(default)]
    pub download: DownloadConfig,

    /// Segmenting stage settings.
    #[serde(default)]
    pub segment: SegmentConfig,

    /// Destination sink settings.
    #[serde(default)]
    pub sink: SinkConfig,

    /// Catalog store settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Observer (status message) settings.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Optional proxy resolution policy for downloads.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Operator authorization.
    #[serde(default)]
    pub operator: OperatorConfig,
}

/// `[feed]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Channel identifier the syndication feed is keyed by.
    #[serde(default)]
    pub channel_id: String,

    /// Full feed URL. When empty, derived from `channel_id`.
    #[serde(default)]
    pub url: String,

    /// Maximum items offered for manual selection.
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            url: String::new(),
            preview_limit: default_preview_limit(),
        }
    }
}

impl FeedConfig {
    /// Resolve the effective feed URL.
    pub fn feed_url(&self) -> String {
        if !self.url.is_empty() {
            self.url.clone()
        } else {
            format!(
                "https://www.youtube.com/feeds/videos.xml?channel_id={}",
                self.channel_id
            )
        }
    }
}

fn default_preview_limit() -> usize {
    5
}

/// `[download]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Retriever format selector (bounded quality).
    #[serde(default = "default_format")]
    pub format: String,

    /// Hard timeout for one retrieval, in seconds.
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,

    /// Working directory for job workspaces.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            timeout_secs: default_download_timeout(),
            workspace_dir: default_workspace_dir(),
        }
    }
}

fn default_format() -> String {
    "best[height<=480]".into()
}
fn default_download_timeout() -> u64 {
    900
}
fn default_workspace_dir() -> String {
    "var/work".into()
}

/// `[segment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Fixed chunk duration in seconds.
    #[serde(default = "default_chunk_seconds")]
    pub chunk_seconds: u32,

    /// Hard timeout for one transcode, in seconds.
    #[serde(default = "default_segment_timeout")]
    pub timeout_secs: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            chunk_seconds: default_chunk_seconds(),
            timeout_secs: default_segment_timeout(),
        }
    }
}

fn default_chunk_seconds() -> u32 {
    240
}
fn default_segment_timeout() -> u64 {
    1800
}

/// `[sink]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Upload endpoint URL.
    #[serde(default)]
    pub endpoint: String,

    /// Destination channel/collection identifier at the sink.
    #[serde(default)]
    pub chat: String,

    /// Name of the env var holding the sink token (never the token itself).
    #[serde(default = "default_sink_token_env")]
    pub token_env: String,

    /// Per-chunk upload timeout, in seconds.
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            chat: String::new(),
            token_env: default_sink_token_env(),
            upload_timeout_secs: default_upload_timeout(),
        }
    }
}

fn default_sink_token_env() -> String {
    "CLIPVAULT_SINK_TOKEN".into()
}
fn default_upload_timeout() -> u64 {
    300
}

/// `[catalog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Https URL of the remote versioned store.
    #[serde(default)]
    pub remote_url: String,

    /// Name of the env var holding the push token.
    #[serde(default = "default_catalog_token_env")]
    pub token_env: String,

    /// Local checkout directory.
    #[serde(default = "default_checkout_dir")]
    pub checkout_dir: String,

    /// Snapshot file name within the checkout.
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,

    /// Maximum number of catalog entries retained.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            remote_url: String::new(),
            token_env: default_catalog_token_env(),
            checkout_dir: default_checkout_dir(),
            snapshot_file: default_snapshot_file(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_catalog_token_env() -> String {
    "CLIPVAULT_CATALOG_TOKEN".into()
}
fn default_checkout_dir() -> String {
    "var/catalog".into()
}
fn default_snapshot_file() -> String {
    "videos.json".into()
}
fn default_max_entries() -> usize {
    25
}

/// `[observer]` section — where status messages are rendered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Message endpoint URL. Empty disables chat rendering (logs only).
    #[serde(default)]
    pub endpoint: String,

    /// Observer chat/channel identifier.
    #[serde(default)]
    pub chat: String,

    /// Name of the env var holding the observer token.
    #[serde(default = "default_observer_token_env")]
    pub token_env: String,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            chat: String::new(),
            token_env: default_observer_token_env(),
        }
    }
}

fn default_observer_token_env() -> String {
    "CLIPVAULT_OBSERVER_TOKEN".into()
}

/// `[proxy]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Whether downloads must go through a resolved proxy.
    #[serde(default)]
    pub enabled: bool,

    /// URL serving a plain-text candidate list, one `host:port` per line.
    #[serde(default)]
    pub list_url: String,

    /// Known reachable endpoint used to probe candidates.
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// Per-probe timeout, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Maximum candidates probed before giving up.
    #[serde(default = "default_max_probes")]
    pub max_probes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            list_url: String::new(),
            probe_url: default_probe_url(),
            probe_timeout_secs: default_probe_timeout(),
            max_probes: default_max_probes(),
        }
    }
}

fn default_probe_url() -> String {
    "https://www.youtube.com/robots.txt".into()
}
fn default_probe_timeout() -> u64 {
    5
}
fn default_max_probes() -> usize {
    10
}

/// `[operator]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// The single authorized operator identity.
    #[serde(default)]
    pub authorized_id: String,
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config sections)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory under which per-job workspaces are created.
    pub workspace_root: PathBuf,
    /// Fixed chunk duration in seconds.
    pub chunk_seconds: u32,
    /// Per-chunk upload timeout.
    pub upload_timeout: Duration,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            workspace_root: PathBuf::from(&config.download.workspace_dir),
            chunk_seconds: config.segment.chunk_seconds,
            upload_timeout: Duration::from_secs(config.sink.upload_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.clipvault/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ClipvaultError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.clipvault/clipvault.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ClipvaultError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ClipvaultError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ClipvaultError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ClipvaultError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ClipvaultError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named by `var_name`.
pub fn secret_from_env(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ClipvaultError::config(format!(
            "secret not found: set the {var_name} environment variable"
        ))),
    }
}
