//! Errors raised while installing the logger

/// Result alias for logger setup
pub type LogResult<T> = Result<T, LogError>;

/// Why the logger could not be installed
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The filter directives do not parse
    #[error("invalid log filter `{filter}`: {reason}")]
    Filter {
        /// The rejected directives
        filter: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("a global logger is already installed: {0}")]
    AlreadyInitialized(String),
}
