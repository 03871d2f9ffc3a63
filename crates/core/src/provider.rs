//! Cache credential providers
//!
//! Credentials are short-lived and owned by the Tuist CLI. Providers only
//! fetch them; caching and invalidation belong to the caller.

use crate::command::{ToolCommand, run_with_timeout};
use crate::configuration::CacheConfiguration;
use crate::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Variables that would let the CLI pick up the build's project context.
const CONTEXT_ENV_VARS: &[&str] = &["PWD", "TUIST_CONFIG_PATH", "TUIST_CURRENT_DIRECTORY"];

/// Default time allowed for `tuist cache config`.
pub const DEFAULT_CONFIG_TIMEOUT: Duration = Duration::from_secs(60);

/// Source of [`CacheConfiguration`]s.
pub trait ConfigurationProvider: Send + Sync {
    /// Fetch a configuration.
    ///
    /// `force_refresh` asks the source to bypass any credential it has
    /// stored. `None` means the cache is unavailable for this build.
    fn configuration(&self, force_refresh: bool) -> Option<CacheConfiguration>;
}

/// Provider that runs `tuist cache config <handle> --json`.
#[derive(Debug, Clone)]
pub struct CommandConfigurationProvider {
    full_handle: String,
    command: ToolCommand,
    url: Option<String>,
    timeout: Duration,
}

impl CommandConfigurationProvider {
    /// Create a provider for `full_handle` using `command` to reach the CLI.
    #[must_use]
    pub fn new(full_handle: impl Into<String>, command: ToolCommand) -> Self {
        Self {
            full_handle: full_handle.into(),
            command,
            url: None,
            timeout: DEFAULT_CONFIG_TIMEOUT,
        }
    }

    /// Forward a server URL to the CLI.
    #[must_use]
    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url.filter(|u| !u.trim().is_empty());
        self
    }

    /// Override the subprocess timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments passed after the command prefix.
    #[must_use]
    pub fn arguments(&self, force_refresh: bool) -> Vec<String> {
        let mut args = vec![
            "cache".to_string(),
            "config".to_string(),
            self.full_handle.clone(),
            "--json".to_string(),
        ];
        if let Some(url) = &self.url {
            args.push("--url".to_string());
            args.push(url.clone());
        }
        if force_refresh {
            args.push("--force-refresh".to_string());
        }
        args
    }

    /// Run the CLI and decode its output.
    ///
    /// The CLI runs from a fresh temporary directory that is removed when
    /// this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the tool error, or [`Error::Serialization`] for empty or
    /// malformed output.
    pub fn fetch(&self, force_refresh: bool) -> Result<CacheConfiguration> {
        let workdir = tempfile::Builder::new()
            .prefix("tuist-gradle-")
            .tempdir()
            .map_err(|e| Error::io(e, "create temp dir"))?;

        let mut command = self.command.command(&self.arguments(force_refresh));
        command.current_dir(workdir.path());
        for var in CONTEXT_ENV_VARS {
            command.env_remove(var);
        }

        let output = run_with_timeout(command, self.timeout)?;
        parse_configuration(&output)
    }
}

impl ConfigurationProvider for CommandConfigurationProvider {
    fn configuration(&self, force_refresh: bool) -> Option<CacheConfiguration> {
        match self.fetch(force_refresh) {
            Ok(config) => {
                debug!(
                    full_handle = %self.full_handle,
                    force_refresh,
                    "Obtained cache configuration"
                );
                Some(config)
            }
            Err(Error::ToolNotFound { program }) => {
                warn!(
                    %program,
                    "Tuist CLI not found. Install Tuist or set executablePath; the remote cache is disabled for this build."
                );
                None
            }
            Err(err) => {
                warn!(full_handle = %self.full_handle, error = %err, "Tuist: could not obtain cache configuration");
                None
            }
        }
    }
}

/// Decode the JSON object printed by `tuist cache config --json`.
///
/// # Errors
///
/// Returns [`Error::Serialization`] when the output is empty or is not a
/// configuration object.
pub fn parse_configuration(output: &str) -> Result<CacheConfiguration> {
    let output = output.trim();
    if output.is_empty() {
        return Err(Error::serialization("tuist cache config returned no output"));
    }
    serde_json::from_str(output)
        .map_err(|e| Error::serialization(format!("tuist cache config returned invalid JSON: {e}")))
}
