//! Engine error → HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use lattica_core::{EngineError, ErrorKind};

/// JSON body for error responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    /// Always `"error"`.
    pub status: String,
    /// Enumerated error kind.
    pub kind: ErrorKind,
    /// Human-readable reason.
    pub reason: String,
}

/// Application-level error that converts into an HTTP response.
#[derive(Debug)]
pub struct AppError(pub EngineError);

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::TransientDependency => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::PermanentDependency => StatusCode::BAD_GATEWAY,
            ErrorKind::DataIntegrity => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = axum::Json(ApiErrorBody {
            status: "error".to_string(),
            kind: self.0.kind(),
            reason: self.0.to_string(),
        });
        (self.status_code(), body).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError(EngineError::InvalidInput("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError(EngineError::NotFound("x".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError(EngineError::Timeout(std::time::Duration::from_secs(1))).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError(EngineError::TransientDependency("x".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError(EngineError::PermanentDependency("x".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError(EngineError::DataIntegrity("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
