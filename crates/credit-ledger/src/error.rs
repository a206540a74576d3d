//! Ledger error types.

use thiserror::Error;

/// Errors that can occur in the credit ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Credit amount rejected (e.g. a non-positive top-up).
    #[error("Invalid credit amount: {0}")]
    InvalidAmount(i64),

    /// Neither a team nor a user was given.
    #[error("No team or user given")]
    MissingOwner,

    /// Storage I/O error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Membership / team / user lookup failed.
    #[error("Directory error: {0}")]
    Directory(String),

    /// Email dispatch failed.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}
