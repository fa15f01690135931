use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chatrelay_core::RelayError;

/// HTTP face of a [`RelayError`].
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub RelayError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::Generation(_) => StatusCode::BAD_GATEWAY,
            RelayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match &self.0 {
            RelayError::Validation(_) => "invalid_request_error",
            RelayError::Generation(_) => "generation_error",
            RelayError::Timeout { .. } => "timeout_error",
            RelayError::Config(_) => "server_error",
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RelayError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = %status, error = %self.0, "request failed");
        }
        let body = serde_json::json!({
            "error": {
                "message": self.0.to_string(),
                "type": self.kind(),
            }
        });
        (status, Json(body)).into_response()
    }
}
