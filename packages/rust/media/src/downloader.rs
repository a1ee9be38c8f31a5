//! Media retrieval via the external `yt-dlp` program.
//!
//! One retrieval per job: the downloader resolves the watch URL from
//! the item id, optionally routes through a resolved proxy, and runs
//! the retriever under a hard timeout. Timeout, non-zero exit, or a
//! missing output artifact all fail the stage with a download error;
//! temporary files are left for orchestrator-level workspace cleanup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, instrument, warn};

use clipvault_shared::{ClipvaultError, DownloadConfig, Result};

use crate::proxy::ProxyResolver;

/// Default external retriever program.
const DEFAULT_PROGRAM: &str = "yt-dlp";

/// Options controlling one retrieval invocation.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Retriever program name or path.
    pub program: String,
    /// Bounded-quality format selector passed to the retriever.
    pub format: String,
    /// Hard execution timeout.
    pub timeout: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.into(),
            format: "best[height<=480]".into(),
            timeout: Duration::from_secs(900),
        }
    }
}

impl From<&DownloadConfig> for DownloadOptions {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            program: DEFAULT_PROGRAM.into(),
            format: config.format.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Retrieves source media for one item.
pub struct Downloader {
    opts: DownloadOptions,
    resolver: Option<Arc<dyn ProxyResolver>>,
}

impl Downloader {
    /// Create a downloader with no proxy policy.
    pub fn new(opts: DownloadOptions) -> Self {
        Self {
            opts,
            resolver: None,
        }
    }

    /// Require retrievals to go through a proxy chosen by `resolver`.
    pub fn with_resolver(mut self, resolver: Arc<dyn ProxyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Retrieve the source media for `item_id` into `workspace`.
    ///
    /// Returns the path of the downloaded full-length file.
    #[instrument(skip_all, fields(item_id = %item_id))]
    pub async fn fetch(&self, item_id: &str, workspace: &Path) -> Result<PathBuf> {
        // No retrieval without a working proxy when the policy requires one.
        let proxy = match &self.resolver {
            Some(resolver) => Some(resolver.resolve().await?),
            None => None,
        };

        let url = watch_url(item_id);
        let template = workspace.join(format!("{item_id}_full.%(ext)s"));

        let mut command = Command::new(&self.opts.program);
        command
            .arg("-f")
            .arg(&self.opts.format)
            .arg("--output")
            .arg(&template)
            .kill_on_drop(true);
        if let Some(proxy) = &proxy {
            command.arg("--proxy").arg(proxy);
        }
        command.arg(&url);

        info!(program = %self.opts.program, %url, proxied = proxy.is_some(), "starting download");

        let output = tokio::time::timeout(self.opts.timeout, command.output())
            .await
            .map_err(|_| {
                ClipvaultError::download(format!(
                    "retrieval timed out after {}s",
                    self.opts.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                ClipvaultError::download(format!(
                    "failed to spawn {}: {e}. Is it installed?",
                    self.opts.program
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClipvaultError::download(format!(
                "{} exited with {}: {}",
                self.opts.program,
                output.status,
                crate::stderr_tail(&stderr, 300)
            )));
        }

        match find_output(workspace, &format!("{item_id}_full")) {
            Some(path) => {
                info!(path = %path.display(), "download complete");
                Ok(path)
            }
            None => {
                warn!("retriever reported success but produced no file");
                Err(ClipvaultError::download(
                    "retriever produced no output artifact",
                ))
            }
        }
    }
}

/// Resolve the source watch URL for an item id.
pub fn watch_url(item_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={item_id}")
}

/// Find the downloaded artifact by its stable file-name prefix; the
/// extension is chosen by the retriever.
fn find_output(workspace: &Path, prefix: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(workspace).ok()?;
    entries
        .flatten()
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Write an executable stub that stands in for the retriever.
    fn stub_program(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-retriever");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh\n{body}").unwrap();
        let mut perms = f.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    /// Stub that creates the file named by the `--output` template.
    const CREATE_OUTPUT: &str = r#"
prev=""
out=""
for a in "$@"; do
  if [ "$prev" = "--output" ]; then out="$a"; fi
  prev="$a"
done
touch "$(printf '%s' "$out" | sed 's/%(ext)s/mp4/')"
"#;

    fn opts(program: &Path, timeout: Duration) -> DownloadOptions {
        DownloadOptions {
            program: program.to_string_lossy().into_owned(),
            format: "best[height<=480]".into(),
            timeout,
        }
    }

    #[test]
    fn watch_url_from_item_id() {
        assert_eq!(watch_url("abc123"), "https://www.youtube.com/watch?v=abc123");
    }

    #[tokio::test]
    async fn fetch_returns_downloaded_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let program = stub_program(dir.path(), CREATE_OUTPUT);
        let downloader = Downloader::new(opts(&program, Duration::from_secs(10)));

        let path = downloader.fetch("vid01", dir.path()).await.expect("fetch");
        assert!(path.exists());
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("vid01_full")
        );
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = stub_program(dir.path(), "echo 'no formats found' >&2\nexit 1");
        let downloader = Downloader::new(opts(&program, Duration::from_secs(10)));

        let err = downloader.fetch("vid01", dir.path()).await.unwrap_err();
        assert!(matches!(err, ClipvaultError::Download(_)));
        assert!(err.to_string().contains("no formats found"));
    }

    #[tokio::test]
    async fn missing_artifact_is_a_download_error() {
        let dir = tempfile::tempdir().unwrap();
        // Exits 0 but writes nothing.
        let program = stub_program(dir.path(), "exit 0");
        let downloader = Downloader::new(opts(&program, Duration::from_secs(10)));

        let err = downloader.fetch("vid01", dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("no output artifact"));
    }

    #[tokio::test]
    async fn slow_retriever_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let program = stub_program(dir.path(), "sleep 30");
        let downloader = Downloader::new(opts(&program, Duration::from_millis(200)));

        let err = downloader.fetch("vid01", dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_program_is_a_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(DownloadOptions {
            program: "/nonexistent/clipvault-test-retriever".into(),
            ..Default::default()
        });

        let err = downloader.fetch("vid01", dir.path()).await.unwrap_err();
        assert!(matches!(err, ClipvaultError::Download(_)));
    }
}
