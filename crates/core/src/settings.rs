//! Declarative configuration blocks for the cache and insights integrations

use crate::command::ToolCommand;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration of the remote build cache.
///
/// Mirrors the block a build script declares:
///
/// ```text
/// tuist {
///     project = "acme/app"
///     buildCache { push = true }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheSettings {
    /// `account/project` handle (alias: `project`)
    #[serde(default, alias = "project")]
    pub full_handle: String,

    /// Path to the Tuist executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,

    /// Full argv prefix used instead of `executable_path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_command: Option<Vec<String>>,

    /// Server URL forwarded to `tuist cache config --url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Allow plain `http://` cache endpoints
    #[serde(default)]
    pub allow_insecure_protocol: bool,

    /// Upload entries to the remote cache
    #[serde(default)]
    pub push: bool,

    /// Use the remote cache at all
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            full_handle: String::new(),
            executable_path: None,
            executable_command: None,
            url: None,
            allow_insecure_protocol: false,
            push: false,
            enabled: true,
        }
    }
}

impl CacheSettings {
    /// Create settings for a project handle with everything else defaulted.
    #[must_use]
    pub fn for_project(full_handle: impl Into<String>) -> Self {
        Self {
            full_handle: full_handle.into(),
            ..Self::default()
        }
    }

    /// Command used to reach the Tuist CLI.
    #[must_use]
    pub fn tool_command(&self) -> ToolCommand {
        ToolCommand::resolve(
            self.executable_path.as_deref(),
            self.executable_command.as_deref(),
        )
    }

    /// Reject settings that cannot produce a working cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the project handle is blank.
    pub fn validate(&self) -> Result<()> {
        if self.full_handle.trim().is_empty() {
            return Err(Error::configuration(
                "project not configured. Set `project = \"account/project\"` in the tuist block",
            ));
        }
        Ok(())
    }
}

/// Configuration of build insights reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InsightsSettings {
    /// Server receiving build reports
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// `account/project` handle
    #[serde(default)]
    pub full_handle: String,

    /// Path to the Tuist executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,

    /// Full argv prefix used instead of `executable_path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_command: Option<Vec<String>>,

    /// Version of the host build tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradle_version: Option<String>,

    /// Version of the runtime the host build tool runs on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<String>,

    /// Name of the root project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_project_name: Option<String>,
}

impl Default for InsightsSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            full_handle: String::new(),
            executable_path: None,
            executable_command: None,
            gradle_version: None,
            java_version: None,
            root_project_name: None,
        }
    }
}

impl InsightsSettings {
    /// Command used to reach the Tuist CLI.
    #[must_use]
    pub fn tool_command(&self) -> ToolCommand {
        ToolCommand::resolve(
            self.executable_path.as_deref(),
            self.executable_command.as_deref(),
        )
    }

    /// Split the handle into `(account, project)`.
    ///
    /// Returns `None` unless the handle has exactly two non-empty parts.
    #[must_use]
    pub fn handles(&self) -> Option<(&str, &str)> {
        match self.full_handle.split('/').collect::<Vec<_>>().as_slice() {
            [account, project] if !account.is_empty() && !project.is_empty() => {
                Some((*account, *project))
            }
            _ => None,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_server_url() -> String {
    "https://tuist.dev".to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_settings_from_block() {
        let settings: CacheSettings = serde_json::from_value(serde_json::json!({
            "project": "acme/app",
            "executableCommand": ["mise", "x", "tuist@latest", "--", "tuist"],
            "push": true
        }))
        .unwrap();

        assert_eq!(settings.full_handle, "acme/app");
        assert!(settings.push);
        assert!(settings.enabled);
        assert!(!settings.allow_insecure_protocol);
        assert_eq!(settings.tool_command().program(), "mise");
    }

    #[test]
    fn test_blank_handle_is_rejected() {
        assert!(CacheSettings::default().validate().is_err());
        assert!(CacheSettings::for_project("acme/app").validate().is_ok());
    }

    #[test]
    fn test_insights_defaults() {
        let settings: InsightsSettings =
            serde_json::from_value(serde_json::json!({ "fullHandle": "acme/app" })).unwrap();

        assert_eq!(settings.server_url, "https://tuist.dev");
        assert_eq!(settings.handles(), Some(("acme", "app")));
    }

    #[test]
    fn test_invalid_handles() {
        for handle in ["", "acme", "acme/", "a/b/c", "/app"] {
            let settings = InsightsSettings {
                full_handle: handle.to_string(),
                ..InsightsSettings::default()
            };
            assert_eq!(settings.handles(), None, "{handle}");
        }
    }
}
