//! Core entities. These are plain data carriers; the store layer
//! (`repo`) owns all persistence logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single ingested post. Identified by its globally-unique URI; created
/// exactly once and never mutated after insertion except by a retention
/// sweep's delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_handle: Option<String>,
    pub author_did: String,
    pub author_degree: i32,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
}

/// A deduplicated external link. `normalized_url` is the dedup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: i32,
    pub original_url: String,
    pub normalized_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub og_image_url: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl Link {
    /// True once either the embed or a fetch has supplied a title — the
    /// point at which the processor's metadata fast path no longer
    /// applies.
    #[must_use]
    pub fn has_title(&self) -> bool {
        self.title.is_some()
    }

    #[must_use]
    pub fn is_fetched(&self) -> bool {
        self.last_fetched_at.is_some()
    }
}

/// A crawled account in the network set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAccount {
    pub did: String,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub degree: i32,
    pub source_count: i32,
    pub source_dids: Vec<String>,
    pub backfill_completed: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// Metadata resolved for a post or embed URL, used by the processor to
/// decide whether the "fast path" applies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl LinkMetadata {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.image_url.is_none()
    }
}

/// One row of the trending projection.
#[derive(Debug, Clone, Serialize)]
pub struct TrendingLink {
    pub link: Link,
    pub share_count: i64,
    pub last_shared_at: DateTime<Utc>,
    pub sharer_dids: Vec<String>,
}

/// A sharer's resolved profile, attached to a `TrendingLink` in the API
/// response shape.
#[derive(Debug, Clone, Serialize)]
pub struct SharerProfile {
    pub did: String,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}
