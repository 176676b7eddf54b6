//! # AppError
//!
//! Centralized error handling for the FoodShare core.
//! Maps business-rule rejections and infrastructure failures to distinct,
//! caller-actionable variants.

use thiserror::Error;

/// The primary error type for all fs-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed required input (e.g., blank name, no location)
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced resource is absent (e.g., Listing, Claim)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Caller lacks ownership or the required role
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Action not permitted given the current status
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Duplicate claim attempt
    #[error("conflict: {0}")]
    Conflict(String),

    /// Infrastructure failure (e.g., DB unreachable)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        AppError::NotFound(kind.to_string(), id.to_string())
    }
}

/// A specialized Result type for FoodShare logic.
pub type Result<T> = std::result::Result<T, AppError>;
