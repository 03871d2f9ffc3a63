//! Error types for the remote cache

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Error type for remote cache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The server rejected the bearer token (HTTP 401)
    #[error("Tuist cache token expired")]
    #[diagnostic(
        code(tuist::cache::token_expired),
        help("Run 'tuist auth login' if this persists after a refresh")
    )]
    TokenExpired,

    /// No configuration could be obtained from the CLI
    #[error("Tuist cache configuration is unavailable")]
    #[diagnostic(
        code(tuist::cache::unavailable),
        help("Check that the Tuist CLI is installed and that you are authenticated")
    )]
    ConfigurationUnavailable,

    /// The server answered with a status the protocol does not allow
    #[error("{operation} cache entry failed with status {status}")]
    #[diagnostic(code(tuist::cache::status))]
    UnexpectedStatus {
        /// What was attempted ("Loading", "Storing", ...)
        operation: &'static str,
        /// HTTP status code
        status: u16,
    },

    /// The cache URL uses plain HTTP without an explicit opt-in
    #[error("Insecure cache URL {url}")]
    #[diagnostic(
        code(tuist::cache::insecure_protocol),
        help("Use an https URL or set allowInsecureProtocol = true")
    )]
    InsecureProtocol {
        /// Offending URL
        url: String,
    },

    /// The server URL could not be turned into a request URL
    #[error("Invalid cache URL {url}: {message}")]
    #[diagnostic(code(tuist::cache::invalid_url))]
    InvalidUrl {
        /// Offending URL
        url: String,
        /// Parser message
        message: String,
    },

    /// The request never produced a response
    #[error("HTTP request failed: {message}")]
    #[diagnostic(code(tuist::cache::transport))]
    Transport {
        /// Transport error message
        message: String,
    },

    /// I/O error while streaming an entry
    #[error("I/O {operation} failed")]
    #[diagnostic(code(tuist::cache::io))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Operation that failed (e.g., "read cache entry")
        operation: String,
    },

    /// Configuration or tool error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] tuist_core::Error),
}

impl Error {
    /// Create a transport error
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
        }
    }

    /// Create an I/O error
    #[must_use]
    pub fn io(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            operation: operation.into(),
        }
    }

    /// Create an invalid URL error
    #[must_use]
    pub fn invalid_url(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: msg.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err.to_string())
    }
}

/// Result type for remote cache operations
pub type Result<T> = std::result::Result<T, Error>;
