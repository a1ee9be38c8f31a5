//! Optional network-indirection policy for downloads.
//!
//! When configured, the downloader must route retrieval through a
//! working proxy. The public-list resolver fetches a small candidate
//! list, probes each candidate against a known reachable endpoint with
//! a short timeout, and selects the first success. Proxy resolution is
//! a pluggable seam, not a core correctness requirement — deployments
//! without the policy simply run the downloader without a resolver.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy};
use tracing::{debug, info, instrument, warn};

use clipvault_shared::{ClipvaultError, ProxyConfig, Result};

/// Chooses a working proxy URL for one retrieval.
#[async_trait]
pub trait ProxyResolver: Send + Sync {
    /// Resolve a working proxy URL (e.g. `http://host:port`), or fail
    /// with a download error when none can be found.
    async fn resolve(&self) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Public-list resolver
// ---------------------------------------------------------------------------

/// Resolver backed by a plain-text public candidate list.
pub struct PublicListResolver {
    client: Client,
    list_url: String,
    probe_url: String,
    probe_timeout: Duration,
    max_probes: usize,
}

impl PublicListResolver {
    /// Build a resolver from the proxy config section.
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs.max(1) * 2))
            .build()
            .map_err(|e| ClipvaultError::download(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            list_url: config.list_url.clone(),
            probe_url: config.probe_url.clone(),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            max_probes: config.max_probes,
        })
    }

    /// Fetch the candidate list and normalize it to proxy URLs.
    async fn candidates(&self) -> Result<Vec<String>> {
        let body = self
            .client
            .get(&self.list_url)
            .send()
            .await
            .map_err(|e| ClipvaultError::download(format!("proxy list fetch: {e}")))?
            .error_for_status()
            .map_err(|e| ClipvaultError::download(format!("proxy list fetch: {e}")))?
            .text()
            .await
            .map_err(|e| ClipvaultError::download(format!("proxy list body: {e}")))?;

        Ok(candidate_lines(&body, self.max_probes))
    }

    /// Probe one candidate against the known reachable endpoint.
    async fn probe(&self, candidate: &str) -> bool {
        let proxy = match Proxy::all(candidate) {
            Ok(p) => p,
            Err(e) => {
                debug!(candidate, error = %e, "invalid proxy candidate");
                return false;
            }
        };

        let client = match Client::builder()
            .proxy(proxy)
            .timeout(self.probe_timeout)
            .build()
        {
            Ok(c) => c,
            Err(_) => return false,
        };

        match client.get(&self.probe_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(candidate, error = %e, "probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl ProxyResolver for PublicListResolver {
    #[instrument(skip_all, fields(list_url = %self.list_url))]
    async fn resolve(&self) -> Result<String> {
        let candidates = self.candidates().await?;
        if candidates.is_empty() {
            return Err(ClipvaultError::download("proxy list yielded no candidates"));
        }

        let total = candidates.len();
        for (i, candidate) in candidates.iter().enumerate() {
            debug!(candidate, probe = i + 1, total, "probing proxy candidate");
            if self.probe(candidate).await {
                info!(candidate, "selected working proxy");
                return Ok(candidate.clone());
            }
        }

        warn!(probed = total, "no working proxy found");
        Err(ClipvaultError::download(format!(
            "no working proxy among {total} candidates"
        )))
    }
}

/// Parse candidate lines into normalized proxy URLs, bounded by `max`.
fn candidate_lines(body: &str, max: usize) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .take(max)
        .map(|line| {
            if line.contains("://") {
                line.to_string()
            } else {
                format!("http://{line}")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(list_url: String) -> ProxyConfig {
        ProxyConfig {
            enabled: true,
            list_url,
            probe_url: "http://probe.invalid/".into(),
            probe_timeout_secs: 1,
            max_probes: 3,
            ..Default::default()
        }
    }

    #[test]
    fn candidate_lines_normalize_and_bound() {
        let body = "1.2.3.4:8080\n\n# comment\nsocks5://5.6.7.8:1080\n9.9.9.9:3128\n10.0.0.1:80\n";
        let lines = candidate_lines(body, 3);
        assert_eq!(
            lines,
            vec![
                "http://1.2.3.4:8080",
                "socks5://5.6.7.8:1080",
                "http://9.9.9.9:3128",
            ]
        );
    }

    #[tokio::test]
    async fn first_working_candidate_wins() {
        let probe_target = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .mount(&probe_target)
            .await;

        // One dead candidate, then the mock server acting as a proxy.
        let proxy_addr = probe_target.uri().trim_start_matches("http://").to_string();
        let list = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/proxies.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("127.0.0.1:1\n{proxy_addr}\n")),
            )
            .mount(&list)
            .await;

        let resolver =
            PublicListResolver::new(&config(format!("{}/proxies.txt", list.uri()))).unwrap();
        let chosen = resolver.resolve().await.expect("resolve");
        assert_eq!(chosen, format!("http://{proxy_addr}"));
    }

    #[tokio::test]
    async fn no_working_candidate_is_a_download_error() {
        let list = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/proxies.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("127.0.0.1:1\n127.0.0.1:2\n"))
            .mount(&list)
            .await;

        let resolver =
            PublicListResolver::new(&config(format!("{}/proxies.txt", list.uri()))).unwrap();
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, ClipvaultError::Download(_)));
        assert!(err.to_string().contains("no working proxy"));
    }

    #[tokio::test]
    async fn empty_list_is_a_download_error() {
        let list = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/proxies.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("\n# nothing here\n"))
            .mount(&list)
            .await;

        let resolver =
            PublicListResolver::new(&config(format!("{}/proxies.txt", list.uri()))).unwrap();
        let err = resolver.resolve().await.unwrap_err();
        assert!(err.to_string().contains("no candidates"));
    }

    #[tokio::test]
    async fn unreachable_list_is_a_download_error() {
        let resolver =
            PublicListResolver::new(&config("http://127.0.0.1:1/proxies.txt".into())).unwrap();
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, ClipvaultError::Download(_)));
    }
}
