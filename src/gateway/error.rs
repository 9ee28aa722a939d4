use crate::storage::StateError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

/// Everything a handler can fail with, mapped onto HTTP status and JSON body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid credentials")]
    AuthenticationFailed,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    #[error("Request body too large")]
    BodyTooLarge,
    #[error(transparent)]
    Storage(#[from] StateError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthenticationFailed | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let body = match self {
            // Login failures keep the `ok` flag the frontend branches on.
            Self::AuthenticationFailed => serde_json::json!({"ok": false, "error": message}),
            Self::Storage(ref e) => {
                tracing::error!("State storage failed: {e}");
                serde_json::json!({"error": message})
            }
            _ => serde_json::json!({"error": message}),
        };
        (status, Json(body)).into_response()
    }
}
