// ABOUTME: Error type for worker task operations.
// ABOUTME: Backend internals use anyhow; callers of WorkerTask get these typed variants.

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker task has not been started")]
    NotStarted,

    #[error("worker task has already terminated")]
    Terminated,

    #[error("backend failed to start: {0}")]
    StartFailed(String),

    #[error("backend worker channel closed")]
    ChannelClosed,
}
