//! Short-lived credentials for the Tuist server

use secrecy::SecretString;
use serde::Deserialize;

/// Cache credentials returned by `tuist cache config --json`.
///
/// A configuration is never mutated: a refresh produces a new value that
/// supersedes the old one. The token only leaves its [`SecretString`] when
/// the `Authorization` header is written.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfiguration {
    /// Base URL of the Tuist server
    pub url: String,
    /// Bearer token used for every request
    pub token: SecretString,
    /// Account the project belongs to
    pub account_handle: String,
    /// Project handle within the account
    pub project_handle: String,
}

impl CacheConfiguration {
    /// Base URL without trailing slashes.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// `account/project` handle these credentials are scoped to.
    #[must_use]
    pub fn full_handle(&self) -> String {
        format!("{}/{}", self.account_handle, self.project_handle)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_deserialize_cli_output() {
        let json = r#"{
            "url": "https://tuist.dev/",
            "token": "secret-token",
            "account_handle": "acme",
            "project_handle": "app"
        }"#;

        let config: CacheConfiguration = serde_json::from_str(json).unwrap();
        assert_eq!(config.base_url(), "https://tuist.dev");
        assert_eq!(config.full_handle(), "acme/app");
        assert_eq!(config.token.expose_secret(), "secret-token");
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = CacheConfiguration {
            url: "https://tuist.dev".to_string(),
            token: "secret-token".into(),
            account_handle: "acme".to_string(),
            project_handle: "app".to_string(),
        };

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("REDACTED"));
        assert!(!format!("{:?}", config.clone()).contains("secret-token"));
    }
}
