//! Feed scanning: which items exist upstream that the catalog lacks?
//!
//! The scanner fetches the syndication feed (newest-first order assumed
//! from the source), diffs it against the catalog's ids, and offers the
//! complement either oldest-first for automatic processing or in feed
//! order for manual selection. An unreachable or malformed feed is
//! treated as "no new items" — the trigger surface must never fail just
//! because the feed had a bad day.

mod parser;

use std::collections::HashSet;

use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use clipvault_shared::{ClipvaultError, FeedItem, Result};

pub use parser::parse_feed;

/// Default timeout in seconds for fetching the feed.
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// User-Agent string for feed requests.
const USER_AGENT: &str = concat!("Clipvault/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Scan options
// ---------------------------------------------------------------------------

/// Configuration for feed fetches.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// FeedScanner
// ---------------------------------------------------------------------------

/// Fetches the external feed and computes items not yet in the catalog.
pub struct FeedScanner {
    client: Client,
    feed_url: String,
}

impl FeedScanner {
    /// Create a new scanner for the given feed URL.
    pub fn new(feed_url: impl Into<String>, opts: &ScanOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| ClipvaultError::feed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            feed_url: feed_url.into(),
        })
    }

    /// Compute the new items, **oldest-first** relative to the feed, so
    /// repeated runs preserve chronological upload order.
    ///
    /// Unreachable or malformed feeds yield an empty set.
    #[instrument(skip_all, fields(feed_url = %self.feed_url))]
    pub async fn scan(&self, existing_ids: &HashSet<String>) -> Vec<FeedItem> {
        let mut new_items = self.new_items(existing_ids).await;
        new_items.reverse();
        new_items
    }

    /// Up to `limit` new items in feed order (newest-first), for manual
    /// selection menus.
    #[instrument(skip_all, fields(feed_url = %self.feed_url, limit = limit))]
    pub async fn preview(&self, existing_ids: &HashSet<String>, limit: usize) -> Vec<FeedItem> {
        let mut new_items = self.new_items(existing_ids).await;
        new_items.truncate(limit);
        new_items
    }

    /// New items in feed order. Fetch or parse failures degrade to empty.
    async fn new_items(&self, existing_ids: &HashSet<String>) -> Vec<FeedItem> {
        let items = match self.fetch_items().await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "feed fetch failed, treating as no new items");
                return Vec::new();
            }
        };

        let new_items: Vec<FeedItem> = items
            .into_iter()
            .filter(|item| !existing_ids.contains(&item.id))
            .collect();

        info!(new_items = new_items.len(), "feed scan complete");
        new_items
    }

    /// Fetch and parse the feed document.
    async fn fetch_items(&self) -> Result<Vec<FeedItem>> {
        let response = self
            .client
            .get(&self.feed_url)
            .send()
            .await
            .map_err(|e| ClipvaultError::feed(format!("{}: {e}", self.feed_url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClipvaultError::feed(format!(
                "{}: HTTP {status}",
                self.feed_url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClipvaultError::feed(format!("failed to read feed body: {e}")))?;

        let items = parser::parse_feed(&body)?;
        debug!(entries = items.len(), "feed parsed");
        Ok(items)
    }
}
