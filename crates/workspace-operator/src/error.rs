use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Binary-crate-wide error type. Wraps [`workspace_types::Error`] for the
/// validation/not-found/conflict kinds shared with the sync agent, and adds
/// the auth/upstream/fatal kinds that only make sense at the API boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Types(#[from] workspace_types::Error),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited")]
    RateLimited,

    #[error("upstream error: {0}")]
    Upstream(#[source] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Types(workspace_types::Error::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Types(workspace_types::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Types(workspace_types::Error::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Types(workspace_types::Error::Upstream(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Types(workspace_types::Error::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if status.is_client_error() {
            json!({ "status": "fail", "data": { "message": self.to_string() } })
        } else {
            json!({ "status": "error", "message": self.to_string(), "code": status.as_u16() })
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
