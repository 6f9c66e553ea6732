pub mod handlers;
pub mod response;

use axum::routing::get;
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
}

pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let cors = if cors_origin == "*" {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(cors_origin.parse::<axum::http::HeaderValue>().unwrap_or_else(|_| {
            axum::http::HeaderValue::from_static("*")
        }))
    };

    Router::new()
        .route("/api/trending", get(handlers::get_trending))
        .route("/api/links/:id/posts", get(handlers::get_link_posts))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
