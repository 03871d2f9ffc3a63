//! Build report payload
//!
//! Optional fields are left out of the JSON when unknown.

use crate::environment::GitInfo;
use crate::tasks::{TaskOutcome, TaskOutcomeData};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tuist_cache::Error as CacheError;
use tuist_cache::Url;

/// Overall result of the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    /// Every task succeeded
    Success,
    /// At least one task failed
    Failure,
}

/// One task in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReportEntry {
    /// Task path
    pub task_path: String,
    /// Classification
    pub outcome: TaskOutcome,
    /// Whether the task can use the build cache
    pub cacheable: bool,
    /// Task duration
    pub duration_ms: u64,
    /// Cache key used by the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    /// Size of the cache entry in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_artifact_size: Option<u64>,
    /// When the task started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Implementation type of the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
}

impl From<TaskOutcomeData> for TaskReportEntry {
    fn from(task: TaskOutcomeData) -> Self {
        Self {
            task_path: task.task_path,
            outcome: task.outcome,
            cacheable: task.cacheable,
            duration_ms: task.duration_ms,
            cache_key: task.cache_key,
            cache_artifact_size: task.cache_artifact_size,
            started_at: task.started_at,
            task_type: task.task_type,
        }
    }
}

/// Body of `POST /api/projects/{account}/{project}/gradle/builds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReportRequest {
    /// Wall-clock duration of the build
    pub duration_ms: u64,
    /// Overall result
    pub status: BuildStatus,
    /// Version of the host build tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradle_version: Option<String>,
    /// Version of the runtime the host runs on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<String>,
    /// Whether the build ran in CI
    pub is_ci: bool,
    /// Current branch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    /// Commit SHA of `HEAD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit_sha: Option<String>,
    /// Nearest tag or abbreviated SHA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Name of the root project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_project_name: Option<String>,
    /// Time saved by tasks whose work was avoided
    pub avoidance_savings_ms: u64,
    /// Finished tasks in completion order
    pub tasks: Vec<TaskReportEntry>,
}

/// Answer to an accepted report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReportResponse {
    /// Server-side build identifier
    pub id: String,
}

/// Everything about a build that is not a task.
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    /// Wall-clock duration of the build
    pub duration_ms: u64,
    /// Whether a task failure was observed
    pub failed: bool,
    /// Version of the host build tool
    pub gradle_version: Option<String>,
    /// Version of the runtime the host runs on
    pub java_version: Option<String>,
    /// Name of the root project
    pub root_project_name: Option<String>,
    /// Whether the build ran in CI
    pub is_ci: bool,
    /// Git state of the checkout
    pub git: GitInfo,
}

/// Sum of the durations of tasks whose work was avoided.
#[must_use]
pub fn avoidance_savings_ms(tasks: &[TaskOutcomeData]) -> u64 {
    tasks
        .iter()
        .filter(|t| t.outcome.is_avoided())
        .map(|t| t.duration_ms)
        .sum()
}

/// Overall status from the failure flag and the task outcomes.
#[must_use]
pub fn build_status(failed: bool, tasks: &[TaskOutcomeData]) -> BuildStatus {
    if failed || tasks.iter().any(|t| t.outcome == TaskOutcome::Failed) {
        BuildStatus::Failure
    } else {
        BuildStatus::Success
    }
}

impl BuildReportRequest {
    /// Assemble the report for a finished build.
    #[must_use]
    pub fn assemble(summary: BuildSummary, tasks: Vec<TaskOutcomeData>) -> Self {
        Self {
            duration_ms: summary.duration_ms,
            status: build_status(summary.failed, &tasks),
            gradle_version: summary.gradle_version,
            java_version: summary.java_version,
            is_ci: summary.is_ci,
            git_branch: summary.git.branch,
            git_commit_sha: summary.git.commit_sha,
            git_ref: summary.git.git_ref,
            root_project_name: summary.root_project_name,
            avoidance_savings_ms: avoidance_savings_ms(&tasks),
            tasks: tasks.into_iter().map(TaskReportEntry::from).collect(),
        }
    }
}

/// Endpoint receiving reports for `account/project`.
///
/// # Errors
///
/// Returns a cache [`CacheError::InvalidUrl`] when `server_url` is not a
/// usable base URL.
pub fn report_url(server_url: &str, account: &str, project: &str) -> Result<Url> {
    let base = server_url.trim_end_matches('/');
    let mut url = Url::parse(base)
        .map_err(|e| Error::from(CacheError::invalid_url(base, e.to_string())))?;
    url.path_segments_mut()
        .map_err(|()| Error::from(CacheError::invalid_url(base, "URL cannot be a base")))?
        .pop_if_empty()
        .extend(["api", "projects", account, project, "gradle", "builds"]);
    Ok(url)
}
