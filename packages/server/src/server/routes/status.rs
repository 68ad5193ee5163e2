use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;
use crate::server::routes::posts::{internal_error, ErrorBody};

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_seconds: u64,
    pub total_posts: u64,
    pub route_count: u64,
    pub last_head_id: Option<String>,
}

/// GET /api/status — operational health at a glance: uptime, how much has
/// been collected, how many routes would be notified, and the id last seen
/// at the top of the listing.
pub async fn status_handler(
    Extension(state): Extension<AppState>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorBody>)> {
    let total_posts = state.storage.count_posts().await.map_err(internal_error)?;
    let route_count = state.storage.count_routes().await.map_err(internal_error)?;
    let last_head_id = state
        .storage
        .last_head_id()
        .await
        .map_err(internal_error)?
        .map(|id| id.0);

    Ok(Json(StatusResponse {
        uptime_seconds: state.started_at.elapsed().as_secs(),
        total_posts,
        route_count,
        last_head_id,
    }))
}
