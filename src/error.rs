use thiserror::Error;

/// Failures surfaced by the scan session API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Rejected before a session starts, e.g. no targets after trimming.
    #[error("validation error: {0}")]
    Validation(String),

    /// The backend call failed; the session is in `Failed` with this message.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("scan session has not finished yet")]
    IncompleteSession,

    #[error("a scan is already running")]
    StateConflict,
}
