use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use saai_core::SaaiError;

/// An error returned to HTTP clients as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// A 500 with the given message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<SaaiError> for ApiError {
    fn from(e: SaaiError) -> Self {
        let status = match &e {
            SaaiError::CommandNotFound(_) => StatusCode::NOT_FOUND,
            SaaiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
