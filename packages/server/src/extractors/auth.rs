use axum::{extract::FromRequestParts, http::request::Parts};
use constant_time_eq::constant_time_eq;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the shared API token.
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Proof that the request carried the configured API token.
///
/// Add this as the first handler parameter: axum runs it before the body is
/// read, so unauthenticated requests never reach the store.
#[derive(Debug)]
pub struct ApiKey;

impl FromRequestParts<AppState> for ApiKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .map(|v| v.as_bytes())
            .ok_or(AppError::Unauthorized)?;

        if !token_matches(provided, state.config.auth.api_token.as_bytes()) {
            return Err(AppError::Unauthorized);
        }
        Ok(ApiKey)
    }
}

fn token_matches(provided: &[u8], expected: &[u8]) -> bool {
    !expected.is_empty() && constant_time_eq(provided, expected)
}
