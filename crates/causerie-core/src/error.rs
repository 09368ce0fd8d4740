use causerie_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the coordination layer.
///
/// "Target offline" is deliberately absent: signaling to an offline user is
/// a normal outcome ([`crate::signaling::DeliveryOutcome::TargetOffline`]),
/// not a fault.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Credential token failed verification.
    #[error("invalid or expired credential token")]
    Auth,

    /// The acting user is not a participant / not the request owner.
    #[error("forbidden: {0}")]
    Authz(String),

    /// A pending request already exists for the (sender, receiver) pair.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Illegal chat-request transition (terminal states are final).
    #[error("illegal state: {0}")]
    State(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Persistence failure. Never retried internally.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => CoreError::NotFound("record not found".into()),
            other => CoreError::Store(other),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;
