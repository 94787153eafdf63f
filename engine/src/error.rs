//! Error types for the Roam engine.

use crate::EntityId;
use thiserror::Error;

/// All possible errors from the Roam engine.
///
/// Errors are `Clone` so they can live inside observable state
/// (`CollectionState::error`, `SearchQueryState::error`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Remote errors
    #[error("network error: {0}")]
    Network(String),

    #[error("entity not found: {0}")]
    NotFound(EntityId),

    #[error("validation failed: {0}")]
    Validation(String),

    // Local state errors
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("poller already running for resource: {0}")]
    AlreadyPolling(String),
}

impl Error {
    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Network(_) => "network",
            Error::NotFound(_) => "not_found",
            Error::Validation(_) => "validation",
            Error::ConcurrencyConflict(_) => "concurrency_conflict",
            Error::AlreadyPolling(_) => "already_polling",
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
