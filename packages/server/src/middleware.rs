use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

/// Answer 408 in the response envelope when a request outlives
/// `server.request_timeout_secs`.
///
/// Only the wait is abandoned. Mutation handlers run their store write and
/// publish on a separate task that keeps going.
pub async fn request_timeout(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let limit = Duration::from_secs(state.config.server.request_timeout_secs);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(%method, %path, timeout_secs = limit.as_secs(), "Request timed out");
            AppError::Timeout.into_response()
        }
    }
}
