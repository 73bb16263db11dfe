//! Maps `ApiError` onto the standard HTTP error body:
//! `{error:true, code, message, detail}`.

use api_store_core::ApiError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct HttpError(pub ApiError);

impl From<ApiError> for HttpError {
    fn from(e: ApiError) -> Self {
        HttpError(e)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let detail = match &self.0 {
            ApiError::InvalidInput(d) | ApiError::InvalidPatch(d) | ApiError::Conflict(d) => {
                Some(d.clone())
            }
            _ => None,
        };
        let body = json!({
            "error": true,
            "code": self.0.code(),
            "message": self.0.client_message(),
            "detail": detail,
        });
        (status, Json(body)).into_response()
    }
}
