use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use feed_watcher::types::{Post, PostId, PostPage};
use serde::{Deserialize, Serialize};

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Deserialize)]
pub struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

/// GET /api/posts — stored posts, newest first.
///
/// Out-of-range paging input is clamped rather than rejected: page floors
/// at 1, limit is held to 1..=100.
pub async fn list_posts_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PostPage>, (StatusCode, Json<ErrorBody>)> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    state
        .storage
        .list_posts(page, limit)
        .await
        .map(Json)
        .map_err(internal_error)
}

/// GET /api/posts/:id — one stored post.
pub async fn get_post_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Post>, (StatusCode, Json<ErrorBody>)> {
    let post = state
        .storage
        .get_post(&PostId::new(id))
        .await
        .map_err(internal_error)?;

    match post {
        Some(post) => Ok(Json(post)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "Post not found".to_string(),
            }),
        )),
    }
}

pub(crate) fn internal_error(e: anyhow::Error) -> (StatusCode, Json<ErrorBody>) {
    tracing::error!(error = ?e, "Request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: "Internal server error".to_string(),
        }),
    )
}
