use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Extension},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::kernel::CheckError;
use crate::server::app::AppState;

/// POST /api/check — on-demand refresh.
///
/// Caller identity for the cooldown window is the client IP. Failures come
/// back as plain text so command-surface callers can relay them verbatim.
pub async fn check_handler(
    Extension(state): Extension<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    let caller = addr.ip().to_string();

    match state.scheduler.request_immediate_check(&caller).await {
        Ok(posts) => (StatusCode::OK, Json(posts)).into_response(),
        Err(e @ CheckError::CooldownActive { .. }) => {
            (StatusCode::TOO_MANY_REQUESTS, e.to_string()).into_response()
        }
        Err(e @ CheckError::Busy) => (StatusCode::CONFLICT, e.to_string()).into_response(),
        Err(e @ CheckError::Timeout(_)) => {
            (StatusCode::GATEWAY_TIMEOUT, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!(error = ?e, "On-demand check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
