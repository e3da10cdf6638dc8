use thiserror::Error;

/// Unified error type for pymeta operations.
///
/// Only failures that must abort the invocation live here. Recoverable
/// configuration problems (bad versioning format, no usable SCM) are carried
/// as plain strings on the strategy/engine and surfaced as warnings; they are
/// escalated to a [PymetaError::Usage] only when the user explicitly invokes
/// an operation that requires a working configuration.
#[derive(Error, Debug)]
pub enum PymetaError {
    #[error("{0}")]
    Usage(String),

    #[error("SCM command failed: {0}")]
    Scm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hook error: {0}")]
    Hook(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results in pymeta
pub type Result<T> = std::result::Result<T, PymetaError>;

impl PymetaError {
    /// Create a fatal usage error with context
    pub fn usage(msg: impl Into<String>) -> Self {
        PymetaError::Usage(msg.into())
    }

    /// Create an SCM subprocess error with context
    pub fn scm(msg: impl Into<String>) -> Self {
        PymetaError::Scm(msg.into())
    }

    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        PymetaError::Config(msg.into())
    }

    /// Create a hook execution error with context
    pub fn hook(msg: impl Into<String>) -> Self {
        PymetaError::Hook(msg.into())
    }
}
