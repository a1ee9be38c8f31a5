//! Progress reporting for running jobs.
//!
//! A job opens one observer message at the start and edits it in place
//! as stages complete, so the operator reads a single growing status
//! block instead of a stream of notifications. Reporting is strictly
//! best-effort: a failed render is logged and swallowed, never allowed
//! to fail the job itself.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::job::Job;

/// Handle to an open, editable observer message.
#[derive(Debug, Clone)]
pub struct StatusMessage {
    /// Observer-assigned message identifier.
    pub id: String,
}

/// Where job status lines are rendered.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Open a new status message. `None` means rendering is
    /// unavailable; the job proceeds with log-only status.
    async fn open(&self, text: &str) -> Option<StatusMessage>;

    /// Re-render the full status text into the open message.
    async fn render(&self, message: &StatusMessage, text: &str);
}

/// Append a status line to `job` and re-render the observer message.
///
/// Every line also lands in the structured log, so a job is always
/// traceable even when no observer message could be opened.
pub async fn report(reporter: &dyn StatusReporter, job: &mut Job, line: impl Into<String>) {
    let line = line.into();
    info!(job_id = %job.id, item_id = %job.item.id, "{line}");
    job.lines.push(line);

    if let Some(message) = &job.message {
        reporter.render(message, &job.status_text()).await;
    }
}

// ---------------------------------------------------------------------------
// Reporters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OpenResponse {
    message_id: String,
}

/// Renders status into a chat-style HTTP observer endpoint.
///
/// `POST {endpoint}` opens a message, `POST {endpoint}/{id}` replaces
/// its text.
pub struct ChatStatus {
    client: Client,
    endpoint: String,
    chat: String,
    token: String,
}

impl ChatStatus {
    pub fn new(
        endpoint: impl Into<String>,
        chat: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            chat: chat.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl StatusReporter for ChatStatus {
    async fn open(&self, text: &str) -> Option<StatusMessage> {
        let result = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "chat": self.chat, "text": text }))
            .send()
            .await;

        let response = match result {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = %r.status(), "observer rejected status message");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "failed to open status message");
                return None;
            }
        };

        match response.json::<OpenResponse>().await {
            Ok(open) => Some(StatusMessage {
                id: open.message_id,
            }),
            Err(e) => {
                warn!(error = %e, "unparseable observer response");
                None
            }
        }
    }

    async fn render(&self, message: &StatusMessage, text: &str) {
        let url = format!("{}/{}", self.endpoint, message.id);
        let result = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "chat": self.chat, "text": text }))
            .send()
            .await;

        match result {
            Ok(r) if !r.status().is_success() => {
                warn!(status = %r.status(), "observer rejected status edit");
            }
            Err(e) => warn!(error = %e, "failed to edit status message"),
            _ => {}
        }
    }
}

/// Renders status into the structured log only.
pub struct LogStatus;

#[async_trait]
impl StatusReporter for LogStatus {
    async fn open(&self, text: &str) -> Option<StatusMessage> {
        info!("{text}");
        Some(StatusMessage { id: "log".into() })
    }

    async fn render(&self, _message: &StatusMessage, text: &str) {
        info!(status = %text, "job status");
    }
}

/// No-op reporter for headless/test usage.
pub struct SilentStatus;

#[async_trait]
impl StatusReporter for SilentStatus {
    async fn open(&self, _text: &str) -> Option<StatusMessage> {
        None
    }

    async fn render(&self, _message: &StatusMessage, _text: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use clipvault_shared::FeedItem;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct RecordingReporter {
        rendered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StatusReporter for RecordingReporter {
        async fn open(&self, _text: &str) -> Option<StatusMessage> {
            Some(StatusMessage { id: "m1".into() })
        }

        async fn render(&self, _message: &StatusMessage, text: &str) {
            self.rendered.lock().unwrap().push(text.to_string());
        }
    }

    fn job() -> Job {
        Job::new(
            FeedItem {
                id: "v1".into(),
                title: "Title".into(),
            },
            PathBuf::from("/tmp/w"),
        )
    }

    #[tokio::test]
    async fn report_renders_accumulated_text_in_place() {
        let reporter = RecordingReporter {
            rendered: Mutex::new(Vec::new()),
        };
        let mut job = job();
        job.message = reporter.open("Processing").await;

        report(&reporter, &mut job, "Downloading...").await;
        report(&reporter, &mut job, "Uploaded part 1/2").await;

        let rendered = reporter.rendered.lock().unwrap();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0], "Downloading...");
        assert_eq!(rendered[1], "Downloading...\nUploaded part 1/2");
    }

    #[tokio::test]
    async fn report_without_open_message_only_logs() {
        let reporter = RecordingReporter {
            rendered: Mutex::new(Vec::new()),
        };
        let mut job = job();
        // No message opened: render must not be called.
        report(&reporter, &mut job, "Downloading...").await;
        assert!(reporter.rendered.lock().unwrap().is_empty());
        assert_eq!(job.lines.len(), 1);
    }

    #[tokio::test]
    async fn chat_status_opens_and_edits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/status"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"message_id":"42"}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/status/42"))
            .and(body_partial_json(json!({ "text": "line 1\nline 2" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let status = ChatStatus::new(format!("{}/status", server.uri()), "chan", "tok");
        let message = status.open("line 1").await.expect("open");
        assert_eq!(message.id, "42");
        status.render(&message, "line 1\nline 2").await;
    }

    #[tokio::test]
    async fn unreachable_observer_is_swallowed() {
        let status = ChatStatus::new("http://127.0.0.1:1/status", "chan", "tok");
        assert!(status.open("hello").await.is_none());
        // render on a stale handle must not panic either
        status
            .render(&StatusMessage { id: "1".into() }, "text")
            .await;
    }
}
