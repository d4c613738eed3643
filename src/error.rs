use axum::response::{IntoResponse, Response};

use crate::blog::repository::StoreError;
use crate::flash::flash_redirect;

/// Failure taxonomy for request handling. Handlers that need a specific
/// redirect target build their own flash redirect instead; converting into a
/// response here lands the visitor on a safe page with a message, so no
/// failure is ever swallowed.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("record not found")]
    NotFound,

    #[error("login required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConstraintViolation(msg) => AppError::Conflict(msg),
            StoreError::Failure(msg) => AppError::Storage(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => flash_redirect("error", "Record not found.", "/error"),
            AppError::Unauthorized => {
                flash_redirect("error", "You need to log in first.", "/login")
            }
            AppError::Forbidden(msg) => flash_redirect("error", &msg, "/error"),
            AppError::Conflict(msg) => flash_redirect("error", &msg, "/error"),
            AppError::Validation(msg) => flash_redirect("error", &msg, "/error"),
            AppError::Storage(msg) => {
                // Internal diagnostics go to the log, never to the visitor.
                tracing::error!("Storage failure: {}", msg);
                flash_redirect("error", "A database error occurred.", "/error")
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};

    fn redirect_target(err: AppError) -> String {
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn unauthorized_redirects_to_login() {
        assert_eq!(redirect_target(AppError::Unauthorized), "/login");
    }

    #[test]
    fn not_found_redirects_to_error_page() {
        assert_eq!(redirect_target(AppError::NotFound), "/error");
    }

    #[test]
    fn storage_failure_hides_diagnostics() {
        let response = AppError::Storage("UNIQUE constraint failed: users.email".into())
            .into_response();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(!cookie.contains("users.email"));
    }

    #[test]
    fn constraint_violation_maps_to_conflict() {
        let err = AppError::from(StoreError::ConstraintViolation("dup".into()));
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn generic_store_failure_maps_to_storage() {
        let err = AppError::from(StoreError::Failure("disk I/O error".into()));
        assert!(matches!(err, AppError::Storage(_)));
    }
}
