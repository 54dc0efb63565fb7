use thiserror::Error;

pub type AttemptResult<T> = Result<T, AttemptError>;

/// Faults that abort a single resolution attempt. The coordinator logs them
/// and moves on to the next attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("embed lookup failed: {0}")]
    Locator(String),
    #[error("manifest capture failed: {0}")]
    Capture(String),
    #[error("attempt task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
