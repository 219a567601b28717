//! Crate-wide error type and result alias.

/// Result alias used across the service and persistence layers.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy surfaced to the controller layer.
///
/// `NotFound`, `InvalidState` and `Validation` are client errors; `Store` is
/// fatal for the request and is never retried internally, since ledger
/// appends are not naturally idempotent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The referenced entity does not exist or is not owned by the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The entity exists but is in a state the operation does not allow.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed or out-of-range input, rejected before any mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl Error {
    /// Returns whether this error maps to a client-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::InvalidState(_) | Error::Validation(_)
        )
    }
}
