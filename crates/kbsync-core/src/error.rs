//! Error types for kbsync
//!
//! This module defines all error types used throughout the crate, together
//! with the classification that tells the reconciler whether a failure means
//! "the remote object is already gone" or "abort this step".

use thiserror::Error;

/// Result type alias for kbsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for kbsync
#[derive(Error, Debug)]
pub enum Error {
    /// Desired-state input is malformed (detected before any network call)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote store answered with a status code >= 300
    #[error("API error ({status_code}): {message}")]
    Api {
        /// HTTP status code returned by the remote store
        status_code: u16,
        /// Response text or status reason
        message: String,
    },

    /// The request never produced a response (connect, TLS, timeout, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A 2xx response whose body does not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Outcome of classifying an [`Error`] for reconciliation purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The remote object does not exist; treat as a transition to absent
    NotFound,
    /// Anything else; propagate to the caller unchanged
    Fatal,
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an API error from a status code and message
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// HTTP status code carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Classify this error.
    ///
    /// Only a 404 is [`Classification::NotFound`]. Client errors, server
    /// errors, transport failures and decode failures are all fatal; there
    /// is no finer split.
    pub fn classify(&self) -> Classification {
        match self.status_code() {
            Some(404) => Classification::NotFound,
            _ => Classification::Fatal,
        }
    }

    /// Shorthand for `classify() == Classification::NotFound`
    pub fn is_not_found(&self) -> bool {
        self.classify() == Classification::NotFound
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_404_is_not_found() {
        assert_eq!(Error::api(404, "Not Found").classify(), Classification::NotFound);

        for code in [400, 401, 403, 409, 429, 500, 502, 503] {
            assert_eq!(
                Error::api(code, "boom").classify(),
                Classification::Fatal,
                "status {} must be fatal",
                code
            );
        }
    }

    #[test]
    fn test_non_api_errors_are_fatal() {
        assert_eq!(Error::transport("connection refused").classify(), Classification::Fatal);
        assert_eq!(Error::decode("expected value").classify(), Classification::Fatal);
        assert_eq!(Error::validation("bad json").classify(), Classification::Fatal);
    }

    #[test]
    fn test_api_error_message_keeps_status() {
        let err = Error::api(409, "conflict on index_pattern");
        let msg = err.to_string();
        assert!(msg.contains("409"));
        assert!(msg.contains("conflict on index_pattern"));
        assert_eq!(err.status_code(), Some(409));
    }
}
