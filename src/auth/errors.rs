use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid token payload")]
    InvalidTokenPayload,
    #[error("Missing authorization header")]
    MissingAuthHeader,
    #[error("Invalid authorization header format")]
    InvalidAuthHeaderFormat,
    #[error("Profile conflict: {0}")]
    ProfileConflict(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code) = match self {
            AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::InvalidTokenPayload
            | AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeaderFormat => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AuthError::ProfileConflict(_) => (StatusCode::CONFLICT, "conflict"),
            AuthError::Database(ref err) => {
                tracing::error!("Database error while authenticating: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let message = match self {
            AuthError::Database(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_code,
            "message": message,
        }));

        (status, body).into_response()
    }
}
