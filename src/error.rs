use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::models::ApiResponse;

/// Domain failures. "Not yet resolvable" is never one of these: the settlement
/// path reports that as a pending status instead.
#[derive(Debug, Error)]
pub enum BettingError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid bet shape: {0}")]
    InvalidBetShape(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no price available for {0}")]
    NoPrice(String),

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    /// A third-party service (LLM, news feed) answered with an error.
    #[error("upstream service error: {0}")]
    Upstream(String),
}

impl BettingError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        BettingError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Error type returned by HTTP handlers.
#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<BettingError>() {
            Some(BettingError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Some(BettingError::InvalidBetShape(_))
            | Some(BettingError::InvalidInput(_))
            | Some(BettingError::NoPrice(_)) => StatusCode::BAD_REQUEST,
            Some(BettingError::DataIntegrity(_)) => StatusCode::CONFLICT,
            Some(BettingError::Upstream(_)) => StatusCode::BAD_GATEWAY,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal error: {:?}", self.0);
            "Internal server error".to_string()
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self.0);
            self.0.to_string()
        };

        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = ApiError::from(BettingError::not_found("parlay", "p1"));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let shape = ApiError::from(BettingError::InvalidBetShape("x".into()));
        assert_eq!(shape.status(), StatusCode::BAD_REQUEST);

        let integrity = ApiError::from(BettingError::DataIntegrity("x".into()));
        assert_eq!(integrity.status(), StatusCode::CONFLICT);

        let upstream = ApiError::from(BettingError::Upstream("x".into()));
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);

        let other = ApiError::from(anyhow::anyhow!("boom"));
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_not_found_message() {
        let err = BettingError::not_found("game", "g42");
        assert_eq!(err.to_string(), "game 'g42' not found");
    }
}
