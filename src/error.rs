use thiserror::Error as ThisError;

/// Errors that can occur in the logging library
#[derive(ThisError, Debug)]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Initialization failed.
    #[error("Initialization error: {0}")]
    Init(String),
    /// A record was submitted after the service started shutting down.
    #[error("log service is shut down")]
    ShutDown,
    /// `shutdown` was called more than once.
    #[error("log service was already shut down")]
    AlreadyShutDown,
    /// The queue stayed full for the whole submit timeout.
    #[error("log queue is full")]
    QueueFull,
    /// A backend hit a fatal resource error earlier and no longer accepts records.
    #[error("backend {0} is unavailable after a fatal error")]
    BackendUnavailable(String),
    /// Compressing or restoring rotated logs failed.
    #[error("Archive error: {0}")]
    Archive(String),
    /// A date could not be formatted into a file name.
    #[error("Date format error: {0}")]
    DateFormat(#[from] time::error::Format),
    /// Record could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
