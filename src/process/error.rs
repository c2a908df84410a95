//! Process supervisor error types.

/// Errors from launching or talking to the supervised process.
#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// A child is already alive under this manager.
    #[error("MCP process is already running")]
    AlreadyRunning,

    /// No child is alive to receive input.
    #[error("MCP process is not running")]
    NotRunning,

    /// The configured executable does not exist.
    #[error("MCP binary not found at: {path}")]
    BinaryNotFound { path: String },

    /// An outgoing message could not be serialized.
    #[error("Failed to encode data: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Spawning or writing to the child failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
