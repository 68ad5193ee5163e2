//! Application setup and router wiring.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use feed_watcher::storage::Storage;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::Scheduler;
use crate::server::routes::{check_handler, get_post_handler, list_posts_handler, status_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub scheduler: Arc<Scheduler>,
    pub started_at: Instant,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/posts", get(list_posts_handler))
        .route("/api/posts/:id", get(get_post_handler))
        .route("/api/status", get(status_handler))
        .route("/api/check", post(check_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
