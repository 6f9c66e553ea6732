use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trawl_core::api_client::ApiClient;
use trawl_core::backfill::{self, BackfillConfig};
use trawl_core::db;
use trawl_core::metadata::MetadataFetcher;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Some(path) = trawl_core::config::parse_config_path_arg("backfill") {
        std::env::set_var("CONFIG_PATH", path);
    }
    let config = trawl_core::config::load_config().expect("failed to load configuration");

    let pool = db::create_pool(&config.database.url())
        .await
        .expect("failed to connect to database");
    db::run_migrations(&pool).await.expect("failed to run migrations");

    let api = ApiClient::new(config.upstream.pds_base_url.clone());
    api.login(&config.upstream.handle, &config.upstream.app_password)
        .await
        .expect("failed to authenticate with upstream API");

    let metadata = MetadataFetcher::new(Duration::from_secs(1));

    let backfill_config = BackfillConfig {
        max_concurrent: config.ingest.max_concurrent,
        posts_per_page: config.ingest.posts_per_page,
        max_pages_per_user: config.ingest.max_pages_per_user,
        lookback: ChronoDuration::hours(i64::from(config.ingest.initial_lookback_hours)),
        max_retries: config.ingest.max_retries,
        retry_backoff_ms: config.ingest.retry_backoff_ms,
        rate_limit: Duration::from_millis(config.ingest.rate_limit_ms),
    };

    let summary = backfill::run(&pool, &api, &metadata, &backfill_config)
        .await
        .expect("backfill run failed");

    info!(
        attempted = summary.accounts_attempted,
        completed = summary.accounts_completed,
        failed = summary.accounts_failed,
        "backfill run complete"
    );
}
