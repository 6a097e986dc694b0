//! Error types for the callable surface and background jobs.
//!
//! Errors are classified the way the RPC layer reports them:
//! - InvalidArgument: rejected before any I/O
//! - NotFound / FailedPrecondition: request was well-formed but cannot be served
//! - Configuration: missing secret or config file problem (fail fast)
//! - Database / Ai: upstream dependency failures

use thiserror::Error;

use crate::ai::AiError;
use crate::db::DbError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("AI generation error: {0}")]
    Ai(#[from] AiError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Ai(e) => e.is_retryable(),
            AppError::Database(_) | AppError::Internal(_) => false,
            _ => false,
        }
    }

    /// Category string matching the RPC error vocabulary.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::InvalidArgument(_) => "invalid-argument",
            AppError::NotFound(_) => "not-found",
            AppError::FailedPrecondition(_) => "failed-precondition",
            AppError::Configuration(_) => "failed-precondition",
            AppError::Database(_) | AppError::Internal(_) => "internal",
            AppError::Ai(e) => {
                if e.is_retryable() {
                    "resource-exhausted"
                } else {
                    "internal"
                }
            }
        }
    }
}
