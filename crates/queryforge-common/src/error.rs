use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Errors surfaced to HTTP clients as `{"detail": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Missing credentials or an unconfigured collaborator.
    #[error("{0}")]
    ServiceUnavailable(String),

    /// The warehouse or the model endpoint failed.
    #[error("{0}")]
    Upstream(String),

    /// The model reply failed the completeness heuristics.
    #[error("{0}")]
    IncompleteOutput(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Wrap an upstream failure as `"<context>: <err>"`.
    pub fn upstream(context: &str, err: impl std::fmt::Display) -> Self {
        ApiError::Upstream(format!("{context}: {err}"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)         => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_)           => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_)
            | ApiError::IncompleteOutput(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", self);
        }
        let body = serde_json::json!({ "detail": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::ServiceUnavailable("x".into()).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::IncompleteOutput("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_upstream_wraps_context() {
        let err = ApiError::upstream("Failed to list catalogs", "connection refused");
        assert_eq!(err.to_string(), "Failed to list catalogs: connection refused");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
