use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// Successful JSend envelope: `{"status":"success","data":...}`. Failure
/// and error cases are produced directly by [`crate::error::ApiError`].
pub struct Success<T>(pub StatusCode, pub T);

impl<T> Success<T> {
    pub fn ok(data: T) -> Self {
        Success(StatusCode::OK, data)
    }

    pub fn created(data: T) -> Self {
        Success(StatusCode::CREATED, data)
    }
}

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "status": "success", "data": self.1 }))).into_response()
    }
}
