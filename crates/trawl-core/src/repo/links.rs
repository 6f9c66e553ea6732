//! Link storage.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::models::{Link, LinkMetadata};

fn row_to_link(row: &sqlx::postgres::PgRow) -> Result<Link, sqlx::Error> {
    Ok(Link {
        id: row.try_get("id")?,
        original_url: row.try_get("original_url")?,
        normalized_url: row.try_get("normalized_url")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        og_image_url: row.try_get("og_image_url")?,
        first_seen_at: row.try_get("first_seen_at")?,
        last_fetched_at: row.try_get("last_fetched_at")?,
    })
}

/// Single-statement get-or-create keyed on `normalized_url`: the
/// load-bearing guarantee that concurrent stream/backfill writers never
/// race a read-then-insert window. `DO UPDATE SET normalized_url =
/// EXCLUDED.normalized_url` is a no-op write that still lets `RETURNING`
/// produce the existing row.
pub async fn get_or_create_link(
    pool: &PgPool,
    original_url: &str,
    normalized_url: &str,
) -> Result<Link, sqlx::Error> {
    let row = sqlx::query(
        r#"INSERT INTO links (original_url, normalized_url)
           VALUES ($1, $2)
           ON CONFLICT (normalized_url)
           DO UPDATE SET normalized_url = EXCLUDED.normalized_url
           RETURNING id, original_url, normalized_url, title, description, og_image_url, first_seen_at, last_fetched_at"#,
    )
    .bind(original_url)
    .bind(normalized_url)
    .fetch_one(pool)
    .await?;

    row_to_link(&row)
}

pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Link>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, original_url, normalized_url, title, description, og_image_url, first_seen_at, last_fetched_at
           FROM links WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_link).transpose()
}

/// Apply fetched or embed-supplied metadata. Only fires the first time
/// (caller checks `has_title()` beforehand), so there is no conflict to
/// resolve here.
pub async fn update_metadata(pool: &PgPool, link_id: i32, metadata: &LinkMetadata) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE links SET title = $2, description = $3, og_image_url = $4, last_fetched_at = now()
           WHERE id = $1"#,
    )
    .bind(link_id)
    .bind(&metadata.title)
    .bind(&metadata.description)
    .bind(&metadata.image_url)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a link as fetched without metadata, so the processor stops
/// retrying it after a permanent or retries-exhausted failure.
pub async fn mark_fetched(pool: &PgPool, link_id: i32) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE links SET last_fetched_at = now() WHERE id = $1")
        .bind(link_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete links whose most recent post is older than `cutoff` and whose
/// total share count is below `trending_threshold` — the "viral link
/// exception" preserves everything at or above the threshold.
pub async fn delete_unshared_below_threshold(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    trending_threshold: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"DELETE FROM links l
           WHERE NOT EXISTS (
               SELECT 1 FROM post_links pl
               JOIN posts p ON p.id = pl.post_id
               WHERE pl.link_id = l.id AND p.created_at >= $1
           )
           AND (SELECT COUNT(*) FROM post_links pl WHERE pl.link_id = l.id) < $2"#,
    )
    .bind(cutoff)
    .bind(trending_threshold)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
