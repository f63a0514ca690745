//! Crate-wide error taxonomy (spec §7).
//!
//! Public, boundary-crossing functions return `Result<T, EngineError>`.
//! Internal helpers use `anyhow::Result` and get converted with `?` via
//! the `From<anyhow::Error>` impl below.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("format error: {0}")]
    FormatError(String),

    #[error("external service failure: {0}")]
    ExternalFailure(String),

    #[error("premium Nexus account required for this operation")]
    PremiumRequired,

    #[error("filesystem error: {0}")]
    FilesystemError(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::ExternalFailure(format!("{err:#}"))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::FilesystemError(err.to_string())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::ExternalFailure(format!("database error: {err}"))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
