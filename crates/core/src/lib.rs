//! Shared building blocks for the Tuist build integrations
//!
//! This crate holds the pieces the remote cache and build insights both need:
//! - [`CacheConfiguration`]: short-lived server credentials
//! - [`ConfigurationProvider`]: where those credentials come from, normally
//!   `tuist cache config --json`
//! - [`ToolCommand`]: resolution and time-bounded invocation of the CLI
//! - the minimum CLI version gate
//! - declarative settings blocks for both integrations

pub mod command;
pub mod configuration;
mod error;
pub mod provider;
pub mod settings;
pub mod version;

pub use command::ToolCommand;
pub use configuration::CacheConfiguration;
pub use error::{Error, Result};
pub use provider::{CommandConfigurationProvider, ConfigurationProvider};
pub use settings::{CacheSettings, InsightsSettings};
pub use version::{MINIMUM_REQUIRED, is_version_sufficient, validate_tool_version};
