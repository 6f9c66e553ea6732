//! Trending aggregation query.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::models::{Link, TrendingLink};

/// Aggregate posts within `[cutoff, now)`, optionally restricted to a
/// single `author_degree`, grouped by link. `degree == 0` means "no
/// restriction".
pub async fn query_trending(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    limit: i64,
    degree: i32,
) -> Result<Vec<TrendingLink>, sqlx::Error> {
    let sql = r#"
        SELECT l.id, l.original_url, l.normalized_url, l.title, l.description, l.og_image_url,
               l.first_seen_at, l.last_fetched_at,
               COUNT(DISTINCT p.id) AS share_count,
               MAX(p.created_at) AS last_shared_at,
               ARRAY_AGG(DISTINCT p.author_did) AS sharer_dids
        FROM links l
        JOIN post_links pl ON pl.link_id = l.id
        JOIN posts p ON p.id = pl.post_id
        WHERE p.created_at >= $1 AND ($3 = 0 OR p.author_degree = $3)
        GROUP BY l.id
        ORDER BY share_count DESC, last_shared_at DESC
        LIMIT $2
    "#;

    let rows = sqlx::query(sql)
        .bind(cutoff)
        .bind(limit)
        .bind(degree)
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            let link = Link {
                id: row.try_get("id")?,
                original_url: row.try_get("original_url")?,
                normalized_url: row.try_get("normalized_url")?,
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                og_image_url: row.try_get("og_image_url")?,
                first_seen_at: row.try_get("first_seen_at")?,
                last_fetched_at: row.try_get("last_fetched_at")?,
            };
            Ok(TrendingLink {
                link,
                share_count: row.try_get("share_count")?,
                last_shared_at: row.try_get("last_shared_at")?,
                sharer_dids: row.try_get("sharer_dids")?,
            })
        })
        .collect()
}
