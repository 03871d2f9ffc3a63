//! Facts about the machine and checkout the build ran in

use std::path::{Path, PathBuf};
use std::time::Duration;
use tuist_core::ToolCommand;

const GIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variables that indicate a CI environment
const CI_VARS: &[&str] = &[
    "JENKINS_URL",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "BITBUCKET_BUILD_NUMBER",
    "BUILDKITE",
    "TRAVIS",
    "TF_BUILD",
];

/// Check if the current process is running in a CI environment.
///
/// `CI` counts when set to anything but empty, `0` or `false`; the
/// provider-specific variables count when present at all.
#[must_use]
pub fn is_ci() -> bool {
    if std::env::var("CI")
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
    {
        return true;
    }

    CI_VARS.iter().any(|var| std::env::var(var).is_ok())
}

/// Git state of the checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitInfo {
    /// Current branch (`HEAD` when detached)
    pub branch: Option<String>,
    /// Commit SHA of `HEAD`
    pub commit_sha: Option<String>,
    /// Nearest tag, or abbreviated SHA without tags
    pub git_ref: Option<String>,
}

impl GitInfo {
    /// Read git state from `dir` (the current directory when `None`).
    ///
    /// Every field is optional: outside a repository, or without git
    /// installed, the result is empty.
    #[must_use]
    pub fn collect(dir: Option<&Path>) -> Self {
        Self {
            branch: git(&["rev-parse", "--abbrev-ref", "HEAD"], dir),
            commit_sha: git(&["rev-parse", "HEAD"], dir),
            git_ref: git(&["describe", "--tags", "--always"], dir),
        }
    }
}

fn git(args: &[&str], dir: Option<&Path>) -> Option<String> {
    let output = ToolCommand::new("git", Vec::new())
        .run(args, dir, GIT_TIMEOUT)
        .ok()?;
    output
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

/// Source of environment facts for the build report.
pub trait BuildEnvironment: Send + Sync {
    /// Whether the build runs in CI.
    fn is_ci(&self) -> bool;

    /// Git state of the checkout.
    fn git_info(&self) -> GitInfo;
}

/// [`BuildEnvironment`] reading the real process environment.
#[derive(Debug, Clone, Default)]
pub struct SystemEnvironment {
    root: Option<PathBuf>,
}

impl SystemEnvironment {
    /// Read git state from `root` instead of the current directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

impl BuildEnvironment for SystemEnvironment {
    fn is_ci(&self) -> bool {
        is_ci()
    }

    fn git_info(&self) -> GitInfo {
        GitInfo::collect(self.root.as_deref())
    }
}
