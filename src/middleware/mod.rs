use axum::{extract::FromRequestParts, http::request::Parts};

use crate::controllers::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity taken from the `X-User-ID` header. Identity is trusted
/// as given; authentication happens upstream.
#[derive(Debug, Clone)]
pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| UserId(id.to_string()))
            .ok_or(ApiError::MissingUserId)
    }
}
