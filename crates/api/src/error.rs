use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use latchkey_core::error::CoreError;
use latchkey_core::registry::RegistryError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`RegistryError`] for the
/// device registry. Implements [`IntoResponse`] to produce consistent JSON
/// error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `latchkey_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A failure reported by the device registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
            },

            AppError::Registry(err) => classify_registry_error(err),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Unreachable or slow registries are a 503; anything else is sanitized to a 500.
fn classify_registry_error(err: &RegistryError) -> (StatusCode, &'static str, String) {
    match err {
        RegistryError::Unavailable(_) | RegistryError::Timeout => {
            tracing::warn!(error = %err, "Device registry unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "REGISTRY_UNAVAILABLE",
                "Device registry is unavailable".to_string(),
            )
        }
        RegistryError::Rejected(msg) => (StatusCode::BAD_REQUEST, "REJECTED", msg.clone()),
        RegistryError::Backend(_) => {
            tracing::error!(error = %err, "Device registry error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
