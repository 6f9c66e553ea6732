//! Retention janitor. Runs once at stream-consumer startup and
//! again on a periodic ticker.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    pub retention_hours: i64,
    pub trending_threshold: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub posts_deleted: u64,
    pub orphaned_edges_deleted: u64,
    pub links_deleted: u64,
}

/// Run one sweep in the fixed order the contract requires: posts first
/// (cascades their edges), then orphaned edges as a safety net, then
/// unshared links. `NetworkAccount` rows are never touched here.
pub async fn sweep(pool: &PgPool, config: &RetentionConfig) -> Result<SweepReport, sqlx::Error> {
    let cutoff = Utc::now() - ChronoDuration::hours(config.retention_hours);

    let posts_deleted = crate::repo::posts::delete_older_than(pool, cutoff).await?;
    let orphaned_edges_deleted = crate::repo::post_links::delete_orphaned(pool).await?;
    let links_deleted =
        crate::repo::links::delete_unshared_below_threshold(pool, cutoff, config.trending_threshold).await?;

    let report = SweepReport {
        posts_deleted,
        orphaned_edges_deleted,
        links_deleted,
    };
    info!(?report, "retention sweep complete");
    Ok(report)
}

/// Spawn the hourly ticker. The caller is expected to have already run
/// one sweep at startup before spawning this.
pub fn spawn_ticker(pool: PgPool, config: RetentionConfig, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it, startup already swept
        loop {
            ticker.tick().await;
            if let Err(e) = sweep(&pool, &config).await {
                tracing::error!(error = %e, "retention sweep failed");
            }
        }
    })
}
