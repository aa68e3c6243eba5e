//! System collaborator error types.

/// Result type alias for system collaborator operations.
pub type Result<T> = std::result::Result<T, SysError>;

/// Errors raised while setting up system collaborators.
#[derive(Debug, thiserror::Error)]
pub enum SysError {
    /// The log filter directive could not be parsed.
    #[error("invalid log filter: {0}")]
    LogFilter(String),

    /// A global subscriber was already installed.
    #[error("logging already initialized: {0}")]
    LogInit(String),
}

impl SysError {
    /// Creates a log filter error.
    #[must_use]
    pub fn log_filter(msg: impl Into<String>) -> Self {
        Self::LogFilter(msg.into())
    }

    /// Creates a logging initialization error.
    #[must_use]
    pub fn log_init(msg: impl Into<String>) -> Self {
        Self::LogInit(msg.into())
    }
}
