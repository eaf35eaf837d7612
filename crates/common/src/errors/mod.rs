//! Error types for the PaperForge knowledge-graph subsystem
//!
//! Provides:
//! - Distinct error variants for each failure mode the spec enumerates
//! - Machine-readable error codes for client/operator tooling
//! - Severity classification for logging

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,

    // Authorization errors (3xxx)
    PermissionDenied,

    // Resource errors (4xxx)
    NotFound,
    EntityNotFound,
    RelationshipNotFound,
    JobNotFound,
    GapNotFound,

    // Conflict errors (5xxx)
    Conflict,
    DuplicateIdempotencyKey,

    // Rate limiting (6xxx)
    RateLimited,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    EmbeddingUnavailable,
    LlmParseError,
    CacheError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    ServiceUnavailable,
    ResolutionDeferred,
    IngestInterrupted,
    QueryTimeout,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFormat => 1003,

            ErrorCode::PermissionDenied => 3001,

            ErrorCode::NotFound => 4001,
            ErrorCode::EntityNotFound => 4002,
            ErrorCode::RelationshipNotFound => 4003,
            ErrorCode::JobNotFound => 4004,
            ErrorCode::GapNotFound => 4005,

            ErrorCode::Conflict => 5001,
            ErrorCode::DuplicateIdempotencyKey => 5002,

            ErrorCode::RateLimited => 6001,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::EmbeddingUnavailable => 8003,
            ErrorCode::LlmParseError => 8004,
            ErrorCode::CacheError => 8005,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
            ErrorCode::ServiceUnavailable => 9004,
            ErrorCode::ResolutionDeferred => 9005,
            ErrorCode::IngestInterrupted => 9006,
            ErrorCode::QueryTimeout => 9007,
        }
    }
}

/// Application error types.
///
/// Every variant here corresponds to one of the error kinds the retrieval/ingest/
/// resolution pipelines must surface: `NotFound`, `PermissionDenied`, `ValidationError`,
/// `RateLimited` (with retry-after), `Unavailable`, `LLMParseError`, `EmbeddingUnavailable`,
/// `ResolutionDeferred`, `IngestInterrupted`, `QueryTimeout`, `InternalError`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Gap not found: {id}")]
    GapNotFound { id: String },

    #[error("Duplicate resource: {message}")]
    Duplicate { message: String },

    #[error("Duplicate idempotency key: {key}")]
    DuplicateIdempotencyKey { key: String },

    /// Rate limited by an upstream LLM/embedding provider. `retry_after_seconds` must be
    /// honored by callers rather than silently retried away.
    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    /// No embedding provider succeeded for the batch; callers must not substitute
    /// partial or fabricated results.
    #[error("Embedding service unavailable: {message}")]
    EmbeddingUnavailable { message: String },

    /// An LLM provider request failed after exhausting the fallback chain.
    #[error("LLM service unavailable: {message}")]
    LlmUnavailable { message: String },

    /// JSON-mode LLM output failed all four parse strategies.
    #[error("Failed to parse LLM JSON response: {message}")]
    LlmParseError { message: String },

    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// A resolver pair could not be confirmed (stage-3 LLM unavailable) and was left
    /// unmerged rather than silently dropped.
    #[error("Resolution deferred for pair ({left}, {right}): {reason}")]
    ResolutionDeferred {
        left: String,
        right: String,
        reason: String,
    },

    /// An ingest job was found `running` at process start and has been marked
    /// interrupted; its checkpoint is preserved for resume.
    #[error("Ingest job {job_id} interrupted, checkpoint preserved at paper {checkpoint_count}")]
    IngestInterrupted {
        job_id: String,
        checkpoint_count: usize,
    },

    /// The query pipeline's overall deadline elapsed before a stage completed.
    #[error("Query timed out after {elapsed_ms}ms in stage {stage}")]
    QueryTimeout { stage: String, elapsed_ms: u64 },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::JobNotFound { .. } => ErrorCode::JobNotFound,
            AppError::GapNotFound { .. } => ErrorCode::GapNotFound,
            AppError::Duplicate { .. } => ErrorCode::Conflict,
            AppError::DuplicateIdempotencyKey { .. } => ErrorCode::DuplicateIdempotencyKey,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingUnavailable { .. } => ErrorCode::EmbeddingUnavailable,
            AppError::LlmUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::LlmParseError { .. } => ErrorCode::LlmParseError,
            AppError::CacheError { .. } => ErrorCode::CacheError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::ResolutionDeferred { .. } => ErrorCode::ResolutionDeferred,
            AppError::IngestInterrupted { .. } => ErrorCode::IngestInterrupted,
            AppError::QueryTimeout { .. } => ErrorCode::QueryTimeout,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether this error represents an internal/operator-facing failure.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::DatabaseConnection { .. }
                | AppError::Internal { .. }
                | AppError::Configuration { .. }
                | AppError::Serialization(_)
                | AppError::EmbeddingError { .. }
                | AppError::EmbeddingUnavailable { .. }
                | AppError::LlmUnavailable { .. }
                | AppError::CacheError { .. }
                | AppError::ServiceUnavailable { .. }
                | AppError::HttpClient(_)
                | AppError::Other(_)
        )
    }

    /// Whether this error was caused by the caller's input/request.
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Retry-after hint in seconds, when applicable. Callers (e.g. the recommendation
    /// proxy) must surface this rather than retrying internally.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            AppError::RateLimited {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

/// Structured error response for cross-boundary reporting (not an HTTP body — this
/// subsystem has no HTTP surface, but callers still need a serializable shape).
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        ErrorResponse {
            error: ErrorDetails {
                code: err.code(),
                message: err.to_string(),
                details: None,
            },
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::CacheError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::JobNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::JobNotFound);
        assert!(err.is_client_error());
    }

    #[test]
    fn test_validation_error_is_client_error() {
        let err = AppError::Validation {
            message: "Invalid name".into(),
            field: Some("name".into()),
        };
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_server_error() {
        let err = AppError::Internal {
            message: "Something went wrong".into(),
        };
        assert!(err.is_server_error());
    }

    #[test]
    fn test_rate_limited_retry_after() {
        let err = AppError::RateLimited {
            retry_after_seconds: 30,
        };
        assert_eq!(err.retry_after_seconds(), Some(30));
    }
}
