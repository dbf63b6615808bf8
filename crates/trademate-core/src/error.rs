//! Error types for trademate-core

use thiserror::Error;

/// Result type alias for trademate-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// Generic error message
    #[error("{0}")]
    Generic(String),

    /// Stage name not recognised
    #[error("Unknown pipeline stage: {0}")]
    UnknownStage(String),

    /// A session lock was poisoned by a panicking writer
    #[error("Session '{0}' is unavailable: lock poisoned")]
    LockPoisoned(String),

    /// No tool registered under the requested name
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Pipeline step failed
    #[error("Step processing failed: {0}")]
    ProcessingFailed(String),
}
