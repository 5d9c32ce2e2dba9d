use thiserror::Error;

/// Caller-facing error taxonomy for the orchestration core. Cloneable so a
/// single producer failure can be handed to every cache waiter.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("generation backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("generation timed out: {0}")]
    Timeout(String),

    #[error("generation failed: {0}")]
    ModelError(String),

    #[error("session already has an exchange in flight")]
    SessionBusy,

    #[error("session does not belong to the requesting user")]
    Forbidden,

    #[error("session has no messages to report on")]
    EmptySession,
}
