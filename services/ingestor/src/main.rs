use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;
use trawl_core::db;
use trawl_core::metadata::MetadataFetcher;
use trawl_core::network::NetworkSet;
use trawl_core::retention::RetentionConfig;
use trawl_core::stream::{self, StreamConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Some(path) = trawl_core::config::parse_config_path_arg("ingestor") {
        std::env::set_var("CONFIG_PATH", path);
    }
    let config = trawl_core::config::load_config().expect("failed to load configuration");

    info!("connecting to database...");
    let pool = db::create_pool(&config.database.url())
        .await
        .expect("failed to connect to database");
    db::run_migrations(&pool).await.expect("failed to run migrations");
    info!("migrations applied");

    let network = NetworkSet::new(config.network.include_2nd_degree, config.network.min_source_count);
    network.load(&pool).await.expect("failed to load network set");

    let metadata = MetadataFetcher::new(Duration::from_secs(1));

    let stream_config = StreamConfig {
        jetstream_url: config.upstream.jetstream_url.clone(),
        cursor_update_interval: Duration::from_secs(config.retention.cursor_update_seconds),
        wanted_collections: vec!["app.bsky.feed.post".to_owned()],
    };
    let retention_config = RetentionConfig {
        retention_hours: i64::from(config.retention.retention_hours),
        trending_threshold: config.retention.trending_threshold,
    };

    let janitor_pool = pool.clone();
    let janitor_config = retention_config;
    let janitor = trawl_core::retention::spawn_ticker(
        janitor_pool,
        janitor_config,
        Duration::from_secs(u64::from(config.retention.cleanup_interval_min) * 60),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutting down ingestor, flushing stream cursor");
        let _ = shutdown_tx.send(true);
    });

    stream::run(&pool, &network, &metadata, &stream_config, &retention_config, shutdown_rx).await;

    janitor.abort();
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C"); },
        _ = terminate => { info!("received SIGTERM"); },
    }
}
