//! Typed errors surfaced at repository and controller boundaries. Worker
//! internals use `anyhow`; these variants exist so callers (API handlers,
//! the job controller) can map failures to the right outcome.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job '{0}' is already registered and running")]
    AlreadyRegistered(String),
}
