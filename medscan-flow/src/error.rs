use thiserror::Error;

/// Errors raised while driving a session through its task graph.
#[derive(Error, Debug)]
pub enum FlowError {
    /// A task returned an error. The underlying cause is kept intact so callers
    /// can downcast it back to their own error type.
    #[error("Task execution failed: {0}")]
    TaskExecutionFailed(anyhow::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Context error: {0}")]
    ContextError(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl FlowError {
    /// Wrap any error as a task failure.
    pub fn task<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        FlowError::TaskExecutionFailed(error.into())
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
