//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// No project owns the given path
    #[error("No project found for {path}")]
    NoProject {
        /// Path that was looked up
        path: String,
    },

    /// One or more covers did not pass
    #[error("Cover run failed: {message}")]
    CoverFailed {
        /// Error message
        message: String,
    },

    /// Browser control is unavailable in this build
    #[error("Browser support is disabled; rebuild with the `browser` feature")]
    BrowserDisabled,

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Moduless library error
    #[error("Moduless error: {0}")]
    Moduless(#[from] moduless::ModulessError),

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing-project error
    #[must_use]
    pub fn no_project(path: impl Into<String>) -> Self {
        Self::NoProject { path: path.into() }
    }

    /// Create a failed-run error
    #[must_use]
    pub fn cover_failed(message: impl Into<String>) -> Self {
        Self::CoverFailed {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
