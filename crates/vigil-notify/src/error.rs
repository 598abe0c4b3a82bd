//! Error types for the notifier client.

use thiserror::Error;

/// Result type for notifier operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors that can occur while talking to the notifier.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event queue closed")]
    QueueClosed,
}
