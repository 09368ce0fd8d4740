use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A query expected exactly one row but found none.
    #[error("record not found")]
    NotFound,

    /// A uniqueness invariant was violated (display name, email).
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// Failure inside a store implementation's backend.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
