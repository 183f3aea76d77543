//! Result and error types for Moduless.

use thiserror::Error;

/// Result type for Moduless operations
pub type ModulessResult<T> = Result<T, ModulessError>;

/// Errors that can occur in Moduless
#[derive(Debug, Error)]
pub enum ModulessError {
    /// Wire payload is not a non-empty list or a field has the wrong shape
    #[error("Invalid message received: {message}")]
    Protocol {
        /// Error message
        message: String,
    },

    /// First element of a wire payload names no registered message type
    #[error("Invalid message type: {name}")]
    UnknownMessageType {
        /// Type name found on the wire
        name: String,
    },

    /// Field count differs from the registered arity
    #[error("Constructor for {name} expects {expected} arguments, but {actual} were specified.")]
    ArityMismatch {
        /// Message type name
        name: String,
        /// Registered arity
        expected: usize,
        /// Fields found on the wire
        actual: usize,
    },

    /// Project configuration file could not be read or understood
    #[error("Invalid project configuration {path}: {message}")]
    Config {
        /// Config file path
        path: String,
        /// Error message
        message: String,
    },

    /// Output file could not be parsed or rewritten
    #[error("Instrumentation failed: {message}")]
    Instrumentation {
        /// Error message
        message: String,
    },

    /// A void command payload is not a call with literal arguments
    #[error("Malformed command {payload:?}: {message}")]
    MalformedCommand {
        /// String payload of the void expression
        payload: String,
        /// Error message
        message: String,
    },

    /// Source map could not be loaded, composed or written
    #[error("Source map error: {message}")]
    SourceMap {
        /// Error message
        message: String,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Error while driving an attached browser
    #[error("Browser error: {message}")]
    Browser {
        /// Error message
        message: String,
    },

    /// No project owns the given path
    #[error("No project found for {path}")]
    NoProjectFor {
        /// Path that was looked up
        path: String,
    },

    /// Remote command name is not known to the tunnel
    #[error("Unknown remote command: {name}")]
    UnknownCommand {
        /// Command name
        name: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// File watcher error
    #[error("Watch error: {message}")]
    Watch {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModulessError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an instrumentation error
    pub fn instrumentation(message: impl Into<String>) -> Self {
        Self::Instrumentation {
            message: message.into(),
        }
    }

    /// Create a source map error
    pub fn source_map(message: impl Into<String>) -> Self {
        Self::SourceMap {
            message: message.into(),
        }
    }

    /// Create a browser error
    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser {
            message: message.into(),
        }
    }

    /// Whether this error rejects a single inbound message only
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::UnknownMessageType { .. } | Self::ArityMismatch { .. }
        )
    }
}

impl From<notify::Error> for ModulessError {
    fn from(err: notify::Error) -> Self {
        Self::Watch {
            message: err.to_string(),
        }
    }
}

impl From<sourcemap::Error> for ModulessError {
    fn from(err: sourcemap::Error) -> Self {
        Self::source_map(err.to_string())
    }
}
