//! Stream cursor singleton.

use sqlx::{PgPool, Row};

/// Read the persisted cursor, if any. Absent means "start from current
/// time" on the next connect.
pub async fn read(pool: &PgPool) -> Result<Option<i64>, sqlx::Error> {
    let row = sqlx::query("SELECT cursor_time_us FROM jetstream_state WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    row.map(|r| r.try_get("cursor_time_us")).transpose()
}

/// Write the latest processed event's microsecond timestamp. Called at a
/// throttled cadence by the stream consumer, and once more on shutdown.
pub async fn write(pool: &PgPool, cursor_time_us: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO jetstream_state (id, cursor_time_us, last_updated)
           VALUES (1, $1, now())
           ON CONFLICT (id) DO UPDATE SET cursor_time_us = EXCLUDED.cursor_time_us, last_updated = now()"#,
    )
    .bind(cursor_time_us)
    .execute(pool)
    .await?;
    Ok(())
}
