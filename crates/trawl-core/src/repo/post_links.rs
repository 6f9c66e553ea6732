//! Post-link edge storage.

use sqlx::PgPool;

/// Idempotent edge insert: composite primary key on (post_id, link_id),
/// on-conflict-do-nothing.
pub async fn insert_edge(pool: &PgPool, post_id: &str, link_id: i32) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO post_links (post_id, link_id) VALUES ($1, $2)
           ON CONFLICT (post_id, link_id) DO NOTHING"#,
    )
    .bind(post_id)
    .bind(link_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Safety-net sweep for edges whose post or link no longer exists.
/// Cascades should make this a no-op in practice; it guards against
/// any path that bypasses the foreign keys.
pub async fn delete_orphaned(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"DELETE FROM post_links pl
           WHERE NOT EXISTS (SELECT 1 FROM posts p WHERE p.id = pl.post_id)
              OR NOT EXISTS (SELECT 1 FROM links l WHERE l.id = pl.link_id)"#,
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
