//! Worker error types.

use thiserror::Error;

use snd_models::InvalidTransition;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Store error: {0}")]
    Store(#[from] snd_store::StoreError),

    #[error("Media error: {0}")]
    Media(#[from] snd_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] snd_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Store(e) => e.is_retryable(),
            WorkerError::Queue(_) | WorkerError::Io(_) => true,
            _ => false,
        }
    }
}
