//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Required field is empty after trimming
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    /// Invalid field value
    #[error("Invalid {field}: {reason}")]
    InvalidFieldValue { field: &'static str, reason: String },

    /// Parse error for incoming data
    #[error("Failed to parse {field}: {reason}")]
    ParseError { field: &'static str, reason: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
