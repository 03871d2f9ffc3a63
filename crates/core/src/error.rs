//! Error types for tool invocation and configuration

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration and tool invocation
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Invalid or missing configuration
    #[error("Tuist configuration error: {message}")]
    #[diagnostic(code(tuist::core::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// The installed tool is older than the minimum supported version
    #[error("Tuist version {version} is not supported. Please update to version {minimum} or later.")]
    #[diagnostic(
        code(tuist::core::unsupported_version),
        help(
            "Run 'tuist update' or visit https://docs.tuist.dev/guides/quick-start/install-tuist for installation instructions"
        )
    )]
    UnsupportedVersion {
        /// Version reported by the tool
        version: String,
        /// Minimum version this integration requires
        minimum: String,
    },

    /// The tool executable could not be found
    #[error("Tuist CLI not found: {program}")]
    #[diagnostic(
        code(tuist::core::tool_not_found),
        help(
            "Install Tuist (https://docs.tuist.dev/guides/quick-start/install-tuist) or set executablePath to its location"
        )
    )]
    ToolNotFound {
        /// Program that failed to spawn
        program: String,
    },

    /// The tool ran but exited unsuccessfully
    #[error("`{command}` failed: {message}")]
    #[diagnostic(code(tuist::core::command))]
    Command {
        /// Command line that was executed
        command: String,
        /// Captured stderr, or the exit status when stderr is empty
        message: String,
    },

    /// The tool did not finish in time
    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    #[diagnostic(code(tuist::core::timeout))]
    Timeout {
        /// Command line that was executed
        command: String,
        /// Time allowed before the process was killed
        timeout: Duration,
    },

    /// I/O error while running the tool
    #[error("I/O {operation} failed")]
    #[diagnostic(code(tuist::core::io))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Operation that failed (e.g., "spawn", "create temp dir")
        operation: String,
    },

    /// Tool output could not be decoded
    #[error("Serialization error: {message}")]
    #[diagnostic(code(tuist::core::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
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

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }
}

/// Result type for configuration and tool invocation
pub type Result<T> = std::result::Result<T, Error>;
