//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`vodforge_core::Error`] so that route
//! handlers can return `Result<T, AppError>` and use `?` directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError(pub vodforge_core::Error);

impl From<vodforge_core::Error> for AppError {
    fn from(e: vodforge_core::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Server-side details (paths, SQL) stay in the log.
        let message = if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.0,
                "Server error in API handler"
            );
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };

        let body = json!({
            "error": message,
            "code": self.0.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}
