//! Post storage.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::models::Post;

/// Insert a post row idempotently (primary key is the URI). Returns
/// `true` if a new row was inserted, `false` if it already existed.
pub async fn insert_idempotent(pool: &PgPool, post: &Post) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"INSERT INTO posts (id, author_handle, author_did, author_degree, content, created_at)
           VALUES ($1, $2, $3, $4, $5, $6)
           ON CONFLICT (id) DO NOTHING"#,
    )
    .bind(&post.id)
    .bind(&post.author_handle)
    .bind(&post.author_did)
    .bind(post.author_degree)
    .bind(&post.content)
    .bind(post.created_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn exists(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM posts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Delete every post created before `cutoff`. Cascades remove the
/// post-link edges belonging to deleted posts.
pub async fn delete_older_than(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM posts WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) fn row_to_post(row: &sqlx::postgres::PgRow) -> Result<Post, sqlx::Error> {
    Ok(Post {
        id: row.try_get("id")?,
        author_handle: row.try_get("author_handle")?,
        author_did: row.try_get("author_did")?,
        author_degree: row.try_get("author_degree")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        indexed_at: row.try_get("indexed_at")?,
    })
}

/// Fetch every post sharing the given link, newest first.
pub async fn posts_for_link(pool: &PgPool, link_id: i32) -> Result<Vec<Post>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT p.id, p.author_handle, p.author_did, p.author_degree, p.content, p.created_at, p.indexed_at
           FROM posts p
           JOIN post_links pl ON pl.post_id = p.id
           WHERE pl.link_id = $1
           ORDER BY p.created_at DESC"#,
    )
    .bind(link_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_post).collect()
}
