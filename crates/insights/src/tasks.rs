//! Task outcomes
//!
//! The host reports each finished task with a coarse result. A result loaded
//! "from cache" does not say which cache; that comes from the metadata the
//! [`OperationTracker`](crate::operations::OperationTracker) recorded while
//! the task ran.

use crate::state::{BuildState, CacheHitType, TaskCacheMetadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Final classification of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Outputs restored from the local build cache
    LocalHit,
    /// Outputs restored from the remote build cache
    RemoteHit,
    /// Outputs already current
    UpToDate,
    /// Actions ran
    Executed,
    /// Actions ran and failed
    Failed,
    /// Not run
    Skipped,
    /// Not run because it had no inputs
    NoSource,
}

impl TaskOutcome {
    /// Wire name of the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalHit => "local_hit",
            Self::RemoteHit => "remote_hit",
            Self::UpToDate => "up_to_date",
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::NoSource => "no_source",
        }
    }

    /// Whether the task's work was avoided.
    #[must_use]
    pub const fn is_avoided(self) -> bool {
        matches!(self, Self::LocalHit | Self::RemoteHit | Self::UpToDate)
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a finished task as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    /// The task succeeded
    Success {
        /// Outputs were loaded from a build cache
        from_cache: bool,
        /// Outputs were already current
        up_to_date: bool,
    },
    /// The task failed
    Failure,
    /// The task was skipped
    Skipped {
        /// Reason given by the host, e.g. `NO-SOURCE`
        message: Option<String>,
    },
}

/// A task finished.
#[derive(Debug, Clone)]
pub struct TaskFinishEvent {
    /// Task path
    pub task_path: String,
    /// Implementation type of the task, when known
    pub task_type: Option<String>,
    /// When the task started
    pub start_time: DateTime<Utc>,
    /// When the task finished
    pub end_time: DateTime<Utc>,
    /// Host result
    pub result: TaskResult,
}

impl TaskFinishEvent {
    /// Task duration; zero if the clock went backwards.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        u64::try_from((self.end_time - self.start_time).num_milliseconds()).unwrap_or(0)
    }
}

/// One finished task as kept for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcomeData {
    /// Task path
    pub task_path: String,
    /// Classification
    pub outcome: TaskOutcome,
    /// Whether the task can use the build cache
    pub cacheable: bool,
    /// Task duration
    pub duration_ms: u64,
    /// Cache key used by the task
    pub cache_key: Option<String>,
    /// Size of the cache entry in bytes
    pub cache_artifact_size: Option<u64>,
    /// When the task started
    pub started_at: Option<DateTime<Utc>>,
    /// Implementation type of the task
    pub task_type: Option<String>,
}

/// Observer of the host's task-completion stream.
pub trait TaskCompletionListener: Send + Sync {
    /// A task finished.
    fn on_task_finished(&self, event: &TaskFinishEvent);
}

/// Classify a task result.
///
/// Returns the outcome and whether the task is cacheable.
#[must_use]
pub fn classify(
    result: &TaskResult,
    metadata: Option<&TaskCacheMetadata>,
    declared_cacheable: bool,
) -> (TaskOutcome, bool) {
    let cacheable = declared_cacheable || metadata.is_some();
    match result {
        TaskResult::Success {
            from_cache: true, ..
        } => {
            let outcome = match metadata.map(|m| m.hit_type) {
                Some(CacheHitType::Remote) => TaskOutcome::RemoteHit,
                _ => TaskOutcome::LocalHit,
            };
            (outcome, true)
        }
        TaskResult::Success {
            up_to_date: true, ..
        } => (TaskOutcome::UpToDate, cacheable),
        TaskResult::Success { .. } => (TaskOutcome::Executed, cacheable),
        TaskResult::Failure => (TaskOutcome::Failed, cacheable),
        TaskResult::Skipped { message } => {
            let no_source = message
                .as_deref()
                .is_some_and(|m| m.to_ascii_uppercase().contains("NO-SOURCE"));
            if no_source {
                (TaskOutcome::NoSource, false)
            } else {
                (TaskOutcome::Skipped, false)
            }
        }
    }
}

/// Turns task-completion events into [`TaskOutcomeData`].
#[derive(Debug, Clone)]
pub struct TaskOutcomeRecorder {
    state: Arc<BuildState>,
}

impl TaskOutcomeRecorder {
    /// Record outcomes into `state`.
    #[must_use]
    pub const fn new(state: Arc<BuildState>) -> Self {
        Self { state }
    }
}

impl TaskCompletionListener for TaskOutcomeRecorder {
    fn on_task_finished(&self, event: &TaskFinishEvent) {
        // Consumed even for a repeated event so nothing lingers for the path
        let metadata = self.state.take_cache_metadata(&event.task_path);
        if !self.state.claim_task(&event.task_path) {
            debug!(task = %event.task_path, "Ignoring repeated finish event");
            return;
        }

        let (outcome, cacheable) = classify(
            &event.result,
            metadata.as_ref(),
            self.state.is_cacheable(&event.task_path),
        );
        if outcome == TaskOutcome::Failed {
            self.state.mark_failed();
        }

        let (cache_key, cache_artifact_size) = metadata
            .map(|m| (m.cache_key, m.artifact_size))
            .unwrap_or_default();

        self.state.push_outcome(TaskOutcomeData {
            task_path: event.task_path.clone(),
            outcome,
            cacheable,
            duration_ms: event.duration_ms(),
            cache_key,
            cache_artifact_size,
            started_at: Some(event.start_time),
            task_type: event.task_type.clone(),
        });
    }
}
