//! Error types for the booking engine.

use crate::domain::RequestStatus;
use crate::ports::ProcessorError;

/// Domain-level errors (business rule violations).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cannot {action} a request that is {from}")]
    InvalidTransition {
        from: RequestStatus,
        action: &'static str,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Service request is already paid")]
    AlreadyPaid,

    #[error("Service request has no chargeable price")]
    InvalidPrice,

    #[error("Service request has already been reviewed")]
    AlreadyReviewed,

    #[error("Amount cannot be negative")]
    NegativeAmount,
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Cannot {action} a request that is {from}")]
    InvalidTransition {
        from: RequestStatus,
        action: &'static str,
    },

    #[error("Service request is already paid")]
    AlreadyPaid,

    #[error("Service request has no chargeable price")]
    InvalidPrice,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment processor error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable snake_case name, exposed in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::AlreadyPaid => "already_paid",
            AppError::InvalidPrice => "invalid_price",
            AppError::Conflict(_) => "conflict",
            AppError::ExternalService(_) => "external_service",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::Validation(msg),
            DomainError::NegativeAmount => {
                AppError::Validation(DomainError::NegativeAmount.to_string())
            }
            DomainError::InvalidTransition { from, action } => {
                AppError::InvalidTransition { from, action }
            }
            DomainError::Unauthorized(msg) => AppError::Unauthorized(msg),
            DomainError::Forbidden(msg) => AppError::Forbidden(msg),
            DomainError::AlreadyPaid => AppError::AlreadyPaid,
            DomainError::InvalidPrice => AppError::InvalidPrice,
            DomainError::AlreadyReviewed => {
                AppError::Conflict(DomainError::AlreadyReviewed.to_string())
            }
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Conflict(e) => AppError::Conflict(e),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
        }
    }
}

impl From<ProcessorError> for AppError {
    fn from(err: ProcessorError) -> Self {
        AppError::ExternalService(err.to_string())
    }
}
