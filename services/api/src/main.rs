mod http;

use tracing::info;
use tracing_subscriber::EnvFilter;
use trawl_core::db;

use crate::http::{build_router, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Some(path) = trawl_core::config::parse_config_path_arg("api") {
        std::env::set_var("CONFIG_PATH", path);
    }
    let config = trawl_core::config::load_config().expect("failed to load configuration");

    let pool = db::create_pool(&config.database.url())
        .await
        .expect("failed to connect to database");
    db::run_migrations(&pool).await.expect("failed to run migrations");

    let state = AppState { pool };
    let router = build_router(state, &config.server.cors_origin);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("api shut down gracefully");
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
