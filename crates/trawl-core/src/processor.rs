//! Shared processor — the single path that writes posts, links,
//! and post-link edges. Both the stream consumer and the backfill worker
//! construct a `RawEvent` from their own wire shape and call `process`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::error::ProcessError;
use crate::metadata::MetadataFetcher;
use crate::models::{LinkMetadata, Post};
use crate::{canonical, repo};

const POST_COLLECTION: &str = "app.bsky.feed.post";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// Where a thumbnail came from: the stream carries a blob reference that
/// must be turned into a CDN URL; the backfill API already hands back a
/// direct URL.
#[derive(Debug, Clone)]
pub enum Thumb {
    Url(String),
    Blob { cid: String },
    None,
}

#[derive(Debug, Clone)]
pub struct ExternalEmbed {
    pub uri: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumb: Thumb,
}

#[derive(Debug, Clone)]
pub struct QuoteEmbed {
    pub quoted_text: String,
    /// The quoted record's own embed, if any — processed recursively
    /// under the outer post's id and author.
    pub nested_external: Option<ExternalEmbed>,
}

#[derive(Debug, Clone)]
pub enum Embed {
    External(ExternalEmbed),
    Quote(QuoteEmbed),
}

#[derive(Debug, Clone)]
pub struct PostRecord {
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub embed: Option<Embed>,
}

/// One normalized upstream event, independent of whether it originated
/// on the WebSocket stream or a backfill page.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub author_id: String,
    pub author_degree: i32,
    pub collection: String,
    pub rkey: String,
    pub operation: Operation,
    pub record: Option<PostRecord>,
}

pub struct Processor<'a> {
    pool: &'a PgPool,
    metadata: &'a MetadataFetcher,
}

impl<'a> Processor<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool, metadata: &'a MetadataFetcher) -> Self {
        Self { pool, metadata }
    }

    /// Convert one event into persistent state.
    pub async fn process(&self, event: RawEvent) -> Result<(), ProcessError> {
        if event.operation != Operation::Create || event.collection != POST_COLLECTION {
            return Ok(());
        }
        let Some(record) = event.record else {
            return Ok(());
        };

        let post_uri = format!("at://{}/{}/{}", event.author_id, event.collection, event.rkey);

        let post = Post {
            id: post_uri.clone(),
            author_handle: None,
            author_did: event.author_id.clone(),
            author_degree: event.author_degree,
            content: record.text.clone(),
            created_at: record.created_at,
            indexed_at: Utc::now(),
        };
        repo::posts::insert_idempotent(self.pool, &post).await?;

        for raw_url in canonical::extract_urls(&record.text) {
            self.process_url(&post_uri, &raw_url, None).await;
        }

        match record.embed {
            Some(Embed::External(embed)) => {
                let metadata = embed_metadata(&embed, &event.author_id);
                self.process_url(&post_uri, &embed.uri, Some(metadata)).await;
            }
            Some(Embed::Quote(quote)) => {
                for raw_url in canonical::extract_urls(&quote.quoted_text) {
                    self.process_url(&post_uri, &raw_url, None).await;
                }
                if let Some(nested) = quote.nested_external {
                    let metadata = embed_metadata(&nested, &event.author_id);
                    self.process_url(&post_uri, &nested.uri, Some(metadata)).await;
                }
            }
            None => {}
        }

        Ok(())
    }

    /// Per-URL processing. Failures here are logged and
    /// non-fatal; the caller's event keeps processing other URLs.
    async fn process_url(&self, post_id: &str, raw_url: &str, embed_metadata: Option<LinkMetadata>) {
        let canonical_url = canonical::canonicalize(raw_url);

        let link = match repo::links::get_or_create_link(self.pool, raw_url, &canonical_url).await {
            Ok(link) => link,
            Err(e) => {
                warn!(url = raw_url, error = %e, "failed to upsert link, skipping");
                return;
            }
        };

        if let Err(e) = repo::post_links::insert_edge(self.pool, post_id, link.id).await {
            warn!(url = raw_url, error = %e, "failed to insert post-link edge");
        }

        if let Some(meta) = embed_metadata.filter(|m| !m.is_empty()) {
            if !link.has_title() {
                if let Err(e) = repo::links::update_metadata(self.pool, link.id, &meta).await {
                    warn!(url = raw_url, error = %e, "failed to write embed-supplied metadata");
                }
                return;
            }
        }

        if link.has_title() || link.is_fetched() {
            return;
        }

        match self.metadata.fetch(&canonical_url).await {
            Ok(meta) => {
                if let Err(e) = repo::links::update_metadata(self.pool, link.id, &meta).await {
                    warn!(url = raw_url, error = %e, "failed to write fetched metadata");
                }
            }
            Err(e) => {
                debug!(url = raw_url, error = %e, "metadata fetch failed, marking fetched to suppress retries");
                if let Err(e) = repo::links::mark_fetched(self.pool, link.id).await {
                    warn!(url = raw_url, error = %e, "failed to mark link fetched");
                }
            }
        }
    }
}

/// Synthesize the CDN thumbnail URL for a blob reference.
#[must_use]
pub fn cdn_thumbnail_url(author_id: &str, cid: &str) -> String {
    format!("https://cdn.bsky.app/img/feed_thumbnail/plain/{author_id}/{cid}@jpeg")
}

/// Parse a raw `app.bsky.feed.post` record body (shared by the stream
/// and backfill adapters) into text/timestamp/embed. `blob_thumbs`
/// selects the stream's blob-reference thumbnail shape over the API's
/// already-resolved URL shape.
#[must_use]
pub fn record_to_post(value: &serde_json::Value, blob_thumbs: bool) -> Option<PostRecord> {
    let text = value.get("text")?.as_str()?.to_owned();
    let created_at = value
        .get("createdAt")
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let embed = value.get("embed").and_then(|e| parse_embed(e, blob_thumbs));
    Some(PostRecord { text, created_at, embed })
}

fn parse_embed(value: &serde_json::Value, blob_thumbs: bool) -> Option<Embed> {
    let embed_type = value.get("$type").and_then(serde_json::Value::as_str)?;

    if embed_type.contains("external") {
        let external = value.get("external")?;
        return Some(Embed::External(parse_external(external, blob_thumbs)?));
    }

    if embed_type.contains("record") {
        let record = value.get("record")?;
        let quoted_value = record.get("value").unwrap_or(record);
        let quoted_text = quoted_value
            .get("text")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let nested_external = quoted_value
            .get("embed")
            .and_then(|e| parse_embed(e, blob_thumbs))
            .and_then(|e| match e {
                Embed::External(ext) => Some(ext),
                Embed::Quote(_) => None,
            });
        return Some(Embed::Quote(QuoteEmbed { quoted_text, nested_external }));
    }

    None
}

fn parse_external(external: &serde_json::Value, blob_thumbs: bool) -> Option<ExternalEmbed> {
    let uri = external.get("uri")?.as_str()?.to_owned();
    let title = external
        .get("title")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .filter(|s| !s.is_empty());
    let description = external
        .get("description")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .filter(|s| !s.is_empty());

    let thumb = match external.get("thumb") {
        None => Thumb::None,
        Some(t) if blob_thumbs => t
            .get("ref")
            .and_then(|r| r.get("$link"))
            .and_then(serde_json::Value::as_str)
            .map(|cid| Thumb::Blob { cid: cid.to_owned() })
            .unwrap_or(Thumb::None),
        Some(t) => t
            .as_str()
            .map(|url| Thumb::Url(url.to_owned()))
            .unwrap_or(Thumb::None),
    };

    Some(ExternalEmbed { uri, title, description, thumb })
}

fn embed_metadata(embed: &ExternalEmbed, author_id: &str) -> LinkMetadata {
    let image_url = match &embed.thumb {
        Thumb::Url(url) => Some(url.clone()),
        Thumb::Blob { cid } => Some(cdn_thumbnail_url(author_id, cid)),
        Thumb::None => None,
    };
    LinkMetadata {
        title: embed.title.clone(),
        description: embed.description.clone(),
        image_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_external_embed_with_blob_thumb() {
        let value = serde_json::json!({
            "text": "check this out",
            "createdAt": "2026-01-01T00:00:00Z",
            "embed": {
                "$type": "app.bsky.embed.external",
                "external": {
                    "uri": "https://example.com",
                    "title": "Example",
                    "description": "desc",
                    "thumb": {"$type": "blob", "ref": {"$link": "bafyreicid"}, "mimeType": "image/jpeg"}
                }
            }
        });
        let record = record_to_post(&value, true).unwrap();
        match record.embed {
            Some(Embed::External(ext)) => {
                assert_eq!(ext.uri, "https://example.com");
                match ext.thumb {
                    Thumb::Blob { cid } => assert_eq!(cid, "bafyreicid"),
                    other => panic!("expected blob thumb, got {other:?}"),
                }
            }
            other => panic!("expected external embed, got {other:?}"),
        }
    }

    #[test]
    fn parses_external_embed_with_direct_url_thumb() {
        let value = serde_json::json!({
            "text": "look",
            "createdAt": "2026-01-01T00:00:00Z",
            "embed": {
                "$type": "app.bsky.embed.external",
                "external": {"uri": "https://example.com", "thumb": "https://cdn.example.com/t.jpg"}
            }
        });
        let record = record_to_post(&value, false).unwrap();
        match record.embed {
            Some(Embed::External(ext)) => match ext.thumb {
                Thumb::Url(url) => assert_eq!(url, "https://cdn.example.com/t.jpg"),
                other => panic!("expected url thumb, got {other:?}"),
            },
            other => panic!("expected external embed, got {other:?}"),
        }
    }

    #[test]
    fn parses_quote_embed_with_nested_text() {
        let value = serde_json::json!({
            "text": "rt this",
            "createdAt": "2026-01-01T00:00:00Z",
            "embed": {
                "$type": "app.bsky.embed.record",
                "record": {"uri": "at://did:plc:x/app.bsky.feed.post/1", "value": {"text": "see https://quoted.example.com"}}
            }
        });
        let record = record_to_post(&value, true).unwrap();
        match record.embed {
            Some(Embed::Quote(q)) => assert!(q.quoted_text.contains("quoted.example.com")),
            other => panic!("expected quote embed, got {other:?}"),
        }
    }

    #[test]
    fn synthesizes_cdn_thumbnail_url_from_blob_cid() {
        let url = cdn_thumbnail_url("did:plc:abc", "bafyreicid");
        assert_eq!(url, "https://cdn.bsky.app/img/feed_thumbnail/plain/did:plc:abc/bafyreicid@jpeg");
    }

    #[test]
    fn embed_metadata_prefers_direct_url_over_blob() {
        let embed = ExternalEmbed {
            uri: "https://example.com".into(),
            title: Some("T".into()),
            description: None,
            thumb: Thumb::Url("https://cdn.example.com/thumb.jpg".into()),
        };
        let meta = embed_metadata(&embed, "did:plc:abc");
        assert_eq!(meta.image_url.as_deref(), Some("https://cdn.example.com/thumb.jpg"));
    }

    #[test]
    fn embed_metadata_synthesizes_from_blob_when_no_direct_url() {
        let embed = ExternalEmbed {
            uri: "https://example.com".into(),
            title: None,
            description: None,
            thumb: Thumb::Blob { cid: "bafy123".into() },
        };
        let meta = embed_metadata(&embed, "did:plc:xyz");
        assert_eq!(
            meta.image_url.as_deref(),
            Some("https://cdn.bsky.app/img/feed_thumbnail/plain/did:plc:xyz/bafy123@jpeg")
        );
    }
}
