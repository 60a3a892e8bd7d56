use std::path::Path;

use axum::Router;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::handlers::{chat_handler, health_handler, home_handler};
use super::server::AppState;

pub(crate) fn build_router(state: AppState, static_dir: &Path, max_body_size: usize) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
