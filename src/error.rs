//! Error types for the StreamHub engine
//!
//! One error enum for the whole crate:
//! - `thiserror` for the variant definitions
//! - variants grouped by the layer that raises them
//! - HTTP status and error-code mapping for API responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;
use tracing::{error, warn};

/// Result type alias for StreamHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the StreamHub engine
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("Configuration error: {message}")]
    Config {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: &'static str },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig {
        key: &'static str,
        message: Cow<'static, str>,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    #[error("Validation failed: {message}")]
    Validation {
        message: Cow<'static, str>,
        field: Option<&'static str>,
    },

    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: Cow<'static, str> },

    #[error("Forbidden: {message}")]
    Forbidden { message: Cow<'static, str> },

    #[error("Conflict: {message}")]
    Conflict { message: Cow<'static, str> },

    // ========================================================================
    // Database Errors
    // ========================================================================
    #[error("Database error: {message}")]
    Database {
        message: Cow<'static, str>,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("Database connection pool exhausted")]
    PoolExhausted,

    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: Cow<'static, str> },

    #[error("Migration error: {0}")]
    Migration(String),

    // ========================================================================
    // Media Storage Errors
    // ========================================================================
    #[error("Media storage error: {message}")]
    Storage {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal server error")]
    Internal {
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    // ========================================================================
    // Constructors for common error patterns
    // ========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a validation error that is not tied to a single field
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error for a named request field
    pub fn invalid_field(field: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field),
        }
    }

    /// Malformed entity identifier
    pub fn invalid_identifier(field: &'static str) -> Self {
        Self::invalid_field(field, "invalid identifier")
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Create a database error
    pub fn database(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Create a media storage error
    pub fn storage(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a media storage error with source
    pub fn storage_with_source(
        message: impl Into<Cow<'static, str>>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error
    pub fn internal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal {
            source: Some(Box::new(source)),
        }
    }

    // ========================================================================
    // Error Classification
    // ========================================================================

    /// Returns true if this error should be logged at error level
    pub fn is_error_level(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } | Error::ConstraintViolation { .. } => StatusCode::CONFLICT,
            Error::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } | Error::MissingEnvVar { .. } | Error::InvalidConfig { .. } => {
                "CONFIG_ERROR"
            }
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Unauthorized { .. } => "UNAUTHORIZED",
            Error::Forbidden { .. } => "FORBIDDEN",
            Error::Conflict { .. } | Error::ConstraintViolation { .. } => "CONFLICT",
            Error::Database { .. } | Error::PoolExhausted | Error::Migration(_) => {
                "DATABASE_ERROR"
            }
            Error::Storage { .. } => "UPSTREAM_SERVICE_ERROR",
            Error::Json(_) => "SERIALIZATION_ERROR",
            Error::Internal { .. } | Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}

// ============================================================================
// Error Response for API
// ============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if self.is_error_level() {
            error!(code, "Request failed: {:?}", self);
        } else {
            warn!(code, "Request rejected: {}", self);
        }

        // Internal details never reach the caller
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let details = match &self {
            Error::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!([{ "field": field, "message": message }])),
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorBody {
                code,
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Error::NotFound {
                entity_type: "record",
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut => Error::PoolExhausted,
            // Only duplicates are conflicts. Check and foreign key failures mean
            // a write slipped past validation and stay server errors.
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Error::ConstraintViolation {
                    message: format!(
                        "Constraint '{}' violated",
                        db_err.constraint().unwrap_or("unique")
                    )
                    .into(),
                }
            }
            sqlx::Error::Database(db_err) => {
                let message = match db_err.constraint() {
                    Some(constraint) => format!("{} ({})", db_err.message(), constraint),
                    None => db_err.message().to_string(),
                };
                Error::Database {
                    message: message.into(),
                    source: Some(err),
                }
            }
            _ => Error::Database {
                message: err.to_string().into(),
                source: Some(err),
            },
        }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Error::Migration(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::storage_with_source(format!("Media storage request failed: {}", err), err)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::not_found("content", "123").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::invalid_identifier("userId").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::forbidden("not the owner").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::storage("upload failed").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Internal { source: None }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::storage("x").error_code(), "UPSTREAM_SERVICE_ERROR");
        assert_eq!(Error::database("x").error_code(), "DATABASE_ERROR");

        // Encoding our own payload is a server fault
        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::from(json);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
    }

    /// Minimal driver error carrying a violation kind
    #[derive(Debug)]
    struct FakeDbError {
        kind: sqlx::error::ErrorKind,
        constraint: &'static str,
    }

    impl std::fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "violates {}", self.constraint)
        }
    }

    impl std::error::Error for FakeDbError {}

    impl sqlx::error::DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "constraint violated"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn constraint(&self) -> Option<&str> {
            Some(self.constraint)
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            match self.kind {
                sqlx::error::ErrorKind::UniqueViolation => sqlx::error::ErrorKind::UniqueViolation,
                sqlx::error::ErrorKind::ForeignKeyViolation => {
                    sqlx::error::ErrorKind::ForeignKeyViolation
                }
                sqlx::error::ErrorKind::CheckViolation => sqlx::error::ErrorKind::CheckViolation,
                _ => sqlx::error::ErrorKind::Other,
            }
        }
    }

    fn db_error(kind: sqlx::error::ErrorKind, constraint: &'static str) -> Error {
        Error::from(sqlx::Error::Database(Box::new(FakeDbError { kind, constraint })))
    }

    #[test]
    fn test_only_unique_violations_conflict() {
        let duplicate = db_error(sqlx::error::ErrorKind::UniqueViolation, "profiles_username_key");
        assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
        assert!(duplicate.to_string().contains("profiles_username_key"));

        let check = db_error(sqlx::error::ErrorKind::CheckViolation, "comments_thread_level_check");
        assert!(matches!(check, Error::Database { .. }));
        assert_eq!(check.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let dangling = db_error(sqlx::error::ErrorKind::ForeignKeyViolation, "comments_content_id_fkey");
        assert_eq!(dangling.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(dangling.error_code(), "DATABASE_ERROR");
    }

    #[tokio::test]
    async fn test_internal_message_is_sanitized() {
        let response = Error::database("password=hunter2 leaked").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn test_validation_details_name_the_field() {
        let response = Error::invalid_identifier("userId").into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["details"][0]["field"], "userId");
    }
}
