use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use parlor_core::CoreError;

/// API-level failure. Every variant maps to a stable machine-readable code
/// plus a human-readable message; clients never see partial successes or
/// internal detail.
#[derive(Debug)]
pub enum ApiError {
    Core(CoreError),
    /// Bad login credentials. Deliberately one code for unknown email and
    /// wrong password.
    Unauthorized,
    /// Registration with an email that is already taken.
    EmailTaken,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::Core(err) => {
                let status = match err {
                    CoreError::UserNotFound
                    | CoreError::ChatNotFound
                    | CoreError::MessageNotFound => StatusCode::NOT_FOUND,
                    CoreError::Validation(_) => StatusCode::BAD_REQUEST,
                    CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = match err {
                    // Internal detail stays in the logs
                    CoreError::Internal(_) => "Internal server error".to_string(),
                    other => other.to_string(),
                };
                (status, err.code(), message)
            }
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid email or password".to_string(),
            ),
            Self::EmailTaken => (
                StatusCode::CONFLICT,
                "email_taken",
                "Email is already registered".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Core(CoreError::Internal(e)) = &self {
            error!("Internal error: {:#}", e);
        }

        let (status, code, message) = self.parts();
        (status, Json(ErrorBody { code, message })).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Core(CoreError::Internal(err))
    }
}
