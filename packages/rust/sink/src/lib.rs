//! Destination sink: where uploaded chunks go.
//!
//! The sink accepts a binary chunk plus a caption and returns an opaque
//! reference string used for future retrieval. The [`Sink`] trait is
//! the seam the pipeline uploads through; [`HttpSink`] is the
//! production implementation, test suites substitute their own.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument};

use clipvault_shared::{ClipvaultError, Result};

/// User-Agent string for sink requests.
const USER_AGENT: &str = concat!("Clipvault/", env!("CARGO_PKG_VERSION"));

/// Pushes one chunk to the destination and returns its opaque reference.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Upload `chunk` with `caption` under a caller-specified timeout.
    async fn upload(&self, chunk: &Path, caption: &str, timeout: Duration) -> Result<String>;
}

// ---------------------------------------------------------------------------
// HTTP sink
// ---------------------------------------------------------------------------

/// Expected response body from the sink endpoint.
#[derive(Debug, Deserialize)]
struct SinkResponse {
    file_id: String,
}

/// HTTP multipart sink implementation.
pub struct HttpSink {
    client: Client,
    endpoint: String,
    chat: String,
    token: String,
}

impl HttpSink {
    /// Create a sink client for `endpoint`, targeting `chat`, with a
    /// bearer `token`.
    pub fn new(
        endpoint: impl Into<String>,
        chat: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ClipvaultError::upload(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            chat: chat.into(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl Sink for HttpSink {
    #[instrument(skip_all, fields(chunk = %chunk.display()))]
    async fn upload(&self, chunk: &Path, caption: &str, timeout: Duration) -> Result<String> {
        let file_name = chunk
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("chunk.mp4")
            .to_string();

        // Stream from disk; chunks can be hundreds of megabytes.
        let file = tokio::fs::File::open(chunk)
            .await
            .map_err(|e| ClipvaultError::io(chunk, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| ClipvaultError::io(chunk, e))?
            .len();

        let form = reqwest::multipart::Form::new()
            .text("chat", self.chat.clone())
            .text("caption", caption.to_string())
            .part(
                "media",
                reqwest::multipart::Part::stream_with_length(reqwest::Body::from(file), size)
                    .file_name(file_name),
            );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .timeout(timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClipvaultError::upload(format!(
                        "upload timed out after {}s",
                        timeout.as_secs()
                    ))
                } else {
                    ClipvaultError::upload(format!("upload request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClipvaultError::upload(format!(
                "sink rejected chunk: HTTP {status}: {}",
                body.trim()
            )));
        }

        let parsed: SinkResponse = response
            .json()
            .await
            .map_err(|e| ClipvaultError::upload(format!("invalid sink response: {e}")))?;

        info!(bytes = size, reference = %parsed.file_id, "chunk uploaded");
        Ok(parsed.file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chunk_file(dir: &Path) -> std::path::PathBuf {
        let p = dir.join("vid01_part_000.mp4");
        std::fs::write(&p, b"chunk bytes").unwrap();
        p
    }

    fn sink_for(server: &MockServer) -> HttpSink {
        HttpSink::new(format!("{}/upload", server.uri()), "chan-1", "secret-token").unwrap()
    }

    #[tokio::test]
    async fn upload_returns_opaque_reference() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"file_id":"ref-42"}"#),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chunk = chunk_file(dir.path());
        let reference = sink_for(&server)
            .upload(&chunk, "Title - Part 1", Duration::from_secs(5))
            .await
            .expect("upload");
        assert_eq!(reference, "ref-42");
    }

    #[tokio::test]
    async fn upload_streams_the_chunk_bytes_into_the_media_part() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"file_id":"ref-1"}"#),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chunk = chunk_file(dir.path());
        sink_for(&server)
            .upload(&chunk, "caption", Duration::from_secs(5))
            .await
            .expect("upload");

        let requests = server.received_requests().await.unwrap();
        let body = &requests[0].body;
        let contains = |needle: &[u8]| body.windows(needle.len()).any(|w| w == needle);
        assert!(contains(b"chunk bytes"));
        assert!(contains(b"name=\"media\""));
        assert!(contains(b"filename=\"vid01_part_000.mp4\""));
    }

    #[tokio::test]
    async fn rejected_chunk_is_an_upload_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(413).set_body_string("too large"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chunk = chunk_file(dir.path());
        let err = sink_for(&server)
            .upload(&chunk, "caption", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ClipvaultError::Upload(_)));
        assert!(err.to_string().contains("413"));
    }

    #[tokio::test]
    async fn missing_reference_is_an_upload_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chunk = chunk_file(dir.path());
        let err = sink_for(&server)
            .upload(&chunk, "caption", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid sink response"));
    }

    #[tokio::test]
    async fn slow_sink_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"file_id":"late"}"#)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chunk = chunk_file(dir.path());
        let err = sink_for(&server)
            .upload(&chunk, "caption", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_chunk_file_is_an_io_error() {
        let server = MockServer::start().await;
        let err = sink_for(&server)
            .upload(Path::new("/nonexistent/chunk.mp4"), "caption", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ClipvaultError::Io { .. }));
    }
}
