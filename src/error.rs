use std::collections::BTreeMap;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;

// Postgres SQLSTATE codes
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

/// Application error surfaced to API clients.
///
/// Every variant is terminal for the request and maps to exactly one HTTP status.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{message}")]
    Validation {
        message: String,
        field_errors: BTreeMap<String, String>,
    },
    #[error("Database error: {0}")]
    Database(sqlx::Error),
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    /// Validation failure on a single field
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut field_errors = BTreeMap::new();
        field_errors.insert(field.to_string(), message.clone());
        AppError::Validation {
            message,
            field_errors,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Validation { .. } => "validation_error",
            AppError::Database(_) | AppError::Internal(_) => "internal_error",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return AppError::not_found("Not found");
        }

        let classified = err.as_database_error().and_then(|db_err| {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => Some(AppError::Conflict(format!(
                    "Record violates uniqueness constraint {}",
                    constraint
                ))),
                Some(FOREIGN_KEY_VIOLATION) => Some(AppError::Validation {
                    message: format!("Referenced record does not exist ({})", constraint),
                    field_errors: BTreeMap::new(),
                }),
                Some(CHECK_VIOLATION) => Some(AppError::Validation {
                    message: format!("Record violates check constraint {}", constraint),
                    field_errors: BTreeMap::new(),
                }),
                _ => None,
            }
        });

        classified.unwrap_or(AppError::Database(err))
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Database(db_err) => AppError::from(db_err),
            AuthError::ProfileConflict(message) => AppError::Conflict(message),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation {
            message: rejection.body_text(),
            field_errors: BTreeMap::new(),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation {
            message: rejection.body_text(),
            field_errors: BTreeMap::new(),
        }
    }
}

// Malformed ids cannot name a row, so they read as missing.
impl From<PathRejection> for AppError {
    fn from(_: PathRejection) -> Self {
        AppError::not_found("Not found")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            AppError::Validation {
                message,
                field_errors,
            } => json!({
                "error": self.error_code(),
                "message": message,
                "field_errors": field_errors,
            }),
            AppError::Database(err) => {
                tracing::error!("Database error: {}", err);
                json!({ "error": self.error_code(), "message": "Internal server error" })
            }
            AppError::Internal(err) => {
                tracing::error!("Internal error: {:#}", err);
                json!({ "error": self.error_code(), "message": "Internal server error" })
            }
            _ => json!({ "error": self.error_code(), "message": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
