use thiserror::Error;
use uuid::Uuid;

/// Typed outcomes surfaced to the boundary layer.
///
/// Collaborator failures (storage, hashing, cipher) are wrapped and never
/// leak internal detail; the caller decides the user-visible message.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Identity already registered")]
    Conflict,

    /// Unknown identity and wrong password deliberately collapse into this
    /// single variant so callers cannot enumerate accounts.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired code")]
    InvalidCode,

    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    /// The one-time code could not be dispatched. The pending attempt still
    /// exists; its id is carried so an out-of-band resend remains possible.
    #[error("Code delivery failed for attempt {attempt_id}")]
    DeliveryFailed { attempt_id: Uuid },

    #[error("Storage unavailable: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    /// True for the variants a caller may retry without changing the request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthError::Storage(_) | AuthError::DeliveryFailed { .. }
        )
    }
}
