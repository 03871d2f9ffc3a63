//! Error types for build insights

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Error type for build report submission
///
/// None of these reach the host build; they end up in a single warning.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The project handle is not `account/project`
    #[error("Invalid fullHandle format for build insights: {handle}")]
    #[diagnostic(
        code(tuist::insights::invalid_handle),
        help("Set fullHandle to \"account/project\"")
    )]
    InvalidHandle {
        /// Configured handle
        handle: String,
    },

    /// The CLI did not hand out credentials
    #[error("Could not get configuration for build insights")]
    #[diagnostic(code(tuist::insights::unavailable))]
    ConfigurationUnavailable,

    /// The server did not accept the report
    #[error("Build report rejected with status {status}")]
    #[diagnostic(code(tuist::insights::rejected))]
    ReportRejected {
        /// HTTP status code
        status: u16,
    },

    /// Encoding the report or decoding the response failed
    #[error("Serialization error: {message}")]
    #[diagnostic(code(tuist::insights::serialization))]
    Serialization {
        /// Error message
        message: String,
    },

    /// Transport or credential error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(tuist_cache::Error),
}

impl Error {
    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }
}

impl From<tuist_cache::Error> for Error {
    fn from(err: tuist_cache::Error) -> Self {
        match err {
            tuist_cache::Error::ConfigurationUnavailable => Self::ConfigurationUnavailable,
            other => Self::Cache(other),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result type for build insights
pub type Result<T> = std::result::Result<T, Error>;
