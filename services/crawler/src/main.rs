use tracing::info;
use tracing_subscriber::EnvFilter;
use trawl_core::api_client::ApiClient;
use trawl_core::db;
use trawl_core::network::crawler::Crawler;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Some(path) = trawl_core::config::parse_config_path_arg("crawler") {
        std::env::set_var("CONFIG_PATH", path);
    }
    let config = trawl_core::config::load_config().expect("failed to load configuration");

    let pool = db::create_pool(&config.database.url())
        .await
        .expect("failed to connect to database");
    db::run_migrations(&pool).await.expect("failed to run migrations");

    let api = ApiClient::new(config.upstream.pds_base_url.clone());
    let operator_did = api
        .login(&config.upstream.handle, &config.upstream.app_password)
        .await
        .expect("failed to authenticate with upstream API");

    let crawler = Crawler::new(
        &api,
        &pool,
        config.network.crawler_rps,
        config.network.min_source_count,
        config.network.include_2nd_degree,
    );
    let summary = crawler
        .run(&config.upstream.handle, &operator_did)
        .await
        .expect("crawl failed");

    info!(
        degree1 = summary.degree1_count,
        degree2_candidates = summary.degree2_candidates,
        degree2_persisted = summary.degree2_persisted,
        failed = summary.failed_accounts,
        "crawl complete"
    );
}
