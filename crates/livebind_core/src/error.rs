//! Error types shared by every livebind crate.

use thiserror::Error;

/// Result type for livebind operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while binding, fetching or rendering.
///
/// None of these is returned to the caller of `start`/`stop`; the engine
/// funnels them into the `sync:error` hook.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} {reason}")]
    HttpStatus {
        /// Status code.
        status: u16,
        /// Canonical reason phrase, empty when unknown.
        reason: String,
    },

    /// Payload could not be read in the declared format.
    ///
    /// Recovered locally by falling back to raw text.
    #[error("decode error: {0}")]
    Decode(String),

    /// A render function failed.
    #[error("render error: {0}")]
    Render(String),

    /// A hook callback failed.
    #[error("plugin error in {hook}: {message}")]
    Plugin {
        /// Hook name the callback was registered for.
        hook: String,
        /// Error message.
        message: String,
    },

    /// Element attributes do not form a valid target.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Endpoint could not be parsed or resolved.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl {
        /// The offending url.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// No async runtime is available to drive transports.
    #[error("no async runtime available")]
    NoRuntime,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
