//! Worker error types.

use thiserror::Error;

/// Main worker error type.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] credit_ledger::LedgerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] serde_json::Error),
}

/// Result type alias for worker errors.
pub type WorkerResult<T> = Result<T, WorkerError>;
