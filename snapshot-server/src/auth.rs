use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::state::AppState;

pub const TOKEN_HEADER: &str = "X-App-Token";

/// Passes when no app token is configured or the request carries the right one.
pub struct Authorized;

#[async_trait]
impl FromRequestParts<AppState> for Authorized {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());

        if token_accepted(state.config.token(), provided) {
            Ok(Authorized)
        } else {
            Err(AppError::Unauthorized("missing or invalid app token".to_string()))
        }
    }
}

pub fn token_accepted(expected: Option<&str>, provided: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => provided.map(str::trim) == Some(expected),
    }
}
