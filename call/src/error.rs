//! Error types for the voice-call orchestration library.

use thiserror::Error;

/// Errors surfaced by the call orchestrator.
#[derive(Debug, Error)]
pub enum CallError {
    /// The user denied microphone access. Kept distinct from transport
    /// failures so the UI can render a dedicated message.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// The relay or upstream connection failed.
    #[error("call transport error: {0}")]
    Transport(String),

    /// The upstream service reported an error event.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The call is not in a state that allows the requested operation.
    #[error("invalid call state: {0}")]
    InvalidState(String),
}

/// Result type for call operations.
pub type CallResult<T> = Result<T, CallError>;

/// Error from the session persistence collaborator. Persistence is
/// best-effort; these are logged, never escalated into [`CallError`].
#[derive(Debug, Error)]
#[error("session store error: {0}")]
pub struct StoreError(pub String);
