use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::{anime, cache, handlers, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Browse and search
        .route("/trending", get(anime::trending))
        .route("/top-rated", get(anime::top_rated))
        .route("/new-arrivals", get(anime::new_arrivals))
        .route("/genre/{genre}", get(anime::by_genre))
        .route("/search", get(anime::search))
        .route("/details/{id}", get(anime::details))
        // Cache management
        .route("/cache/clear", post(cache::clear))
        .route("/cache/stats", get(cache::stats))
        .route("/cache/warmup", post(cache::warmup))
        .route("/cache/health", get(cache::health));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_origin(Any);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
