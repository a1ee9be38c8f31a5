//! Syndication feed parser.
//!
//! Extracts `{id, title}` pairs from an Atom/RSS feed document. The
//! parser is deliberately tolerant: it works entry-by-entry, skips
//! entries it cannot make sense of, and only fails when the document
//! contains no recognizable entries at all. Feed order (newest-first
//! from the source) is preserved.

use regex::Regex;
use std::sync::LazyLock;

use clipvault_shared::{ClipvaultError, FeedItem, Result};

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches one `<entry>...</entry>` block.
static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<entry\b[^>]*>(.*?)</entry>").expect("entry regex"));

/// Matches the dedicated video-id element used by YouTube feeds.
static VIDEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<yt:videoId>([^<]+)</yt:videoId>").expect("videoId regex"));

/// Fallback: the generic Atom `<id>` element, with an optional `yt:video:` prefix.
static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<id>(?:yt:video:)?([^<]+)</id>").expect("id regex"));

/// Matches the entry `<title>` element.
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<title\b[^>]*>(.*?)</title>").expect("title regex"));

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a feed document into items, newest-first (source order).
///
/// Returns `FeedParse` when the document yields no entries at all;
/// individual unparseable entries are skipped with a warning.
pub fn parse_feed(body: &str) -> Result<Vec<FeedItem>> {
    let mut items = Vec::new();

    for entry in ENTRY_RE.captures_iter(body) {
        let block = &entry[1];
        match parse_entry(block) {
            Some(item) => items.push(item),
            None => {
                tracing::warn!("skipping feed entry without id or title");
            }
        }
    }

    if items.is_empty() {
        return Err(ClipvaultError::feed(
            "document contains no recognizable feed entries",
        ));
    }

    Ok(items)
}

/// Parse a single entry block. `None` when id or title is missing.
fn parse_entry(block: &str) -> Option<FeedItem> {
    let id = VIDEO_ID_RE
        .captures(block)
        .or_else(|| ID_RE.captures(block))
        .map(|c| c[1].trim().to_string())?;

    let title = TITLE_RE
        .captures(block)
        .map(|c| unescape(c[1].trim()))
        .filter(|t| !t.is_empty())?;

    if id.is_empty() {
        return None;
    }

    Some(FeedItem { id, title })
}

/// Decode the XML entities that appear in feed titles.
fn unescape(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
}
