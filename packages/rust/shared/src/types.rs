//! Core domain types for the Clipvault catalog and feed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for job identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Catalog entries
// ---------------------------------------------------------------------------

/// One uploaded chunk of a catalogued item.
///
/// `file_id` is the opaque reference returned by the destination sink;
/// it is only meaningful to the sink that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// 1-based chunk index, strictly increasing within an entry.
    pub part_num: u32,
    /// Opaque sink reference for retrieving this chunk later.
    pub file_id: String,
}

/// A fully processed item in the catalog snapshot.
///
/// The persisted snapshot is a JSON array of entries ordered
/// newest-first and capped at the configured maximum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Stable external identifier, unique within the catalog.
    pub id: String,
    /// Item title as published by the feed.
    pub title: String,
    /// Uploaded chunks in ascending `part_num` order.
    pub parts: Vec<Part>,
}

// ---------------------------------------------------------------------------
// Feed items
// ---------------------------------------------------------------------------

/// A candidate item from the external feed.
///
/// Ephemeral: recomputed on every scan and never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Stable external identifier (matches [`CatalogEntry::id`] once processed).
    pub id: String,
    /// Item title.
    pub title: String,
}

/// Truncate a title for status lines and menus, the way the operator
/// surface displays long names.
pub fn short_title(title: &str, max_chars: usize) -> String {
    if title.chars().count() <= max_chars {
        title.to_string()
    } else {
        let cut: String = title.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
