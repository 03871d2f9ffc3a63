//! Build-scoped state shared by the listeners and the report
//!
//! One [`BuildState`] lives for exactly one build. The operation listener
//! writes the open-operation maps and the cache metadata, the task listener
//! turns metadata into [`TaskOutcomeData`], and the report reads the outcomes
//! once at the end.

use crate::operations::OperationId;
use crate::tasks::TaskOutcomeData;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Where a task's cache entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheHitType {
    /// Loaded from the local build cache
    Local,
    /// Loaded from the remote build cache
    Remote,
    /// Looked up without a hit, or packed for storing
    Miss,
}

/// Cache activity observed for a task that has not finished yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCacheMetadata {
    /// Cache key of the entry
    pub cache_key: Option<String>,
    /// Size of the entry archive in bytes
    pub artifact_size: Option<u64>,
    /// Provenance of the entry
    pub hit_type: CacheHitType,
}

/// Everything recorded about one build.
#[derive(Debug)]
pub struct BuildState {
    started_at: DateTime<Utc>,
    started: Instant,
    /// Open operation -> parent operation
    parents: DashMap<OperationId, OperationId>,
    /// Open task-execution operation -> task path
    task_paths: DashMap<OperationId, String>,
    /// Task path -> pending cache metadata
    cache_metadata: DashMap<String, TaskCacheMetadata>,
    outcomes: Mutex<Vec<TaskOutcomeData>>,
    reported: DashSet<String>,
    cacheable_tasks: RwLock<HashSet<String>>,
    failed: AtomicBool,
}

impl Default for BuildState {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildState {
    /// Start tracking a build now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            parents: DashMap::new(),
            task_paths: DashMap::new(),
            cache_metadata: DashMap::new(),
            outcomes: Mutex::new(Vec::new()),
            reported: DashSet::new(),
            cacheable_tasks: RwLock::new(HashSet::new()),
            failed: AtomicBool::new(false),
        }
    }

    /// Wall-clock start of the build.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since the build started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Register tasks the host declares cacheable.
    pub fn set_cacheable_tasks<I, S>(&self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cacheable_tasks
            .write()
            .extend(paths.into_iter().map(Into::into));
    }

    /// Whether the host declared `task_path` cacheable.
    #[must_use]
    pub fn is_cacheable(&self, task_path: &str) -> bool {
        self.cacheable_tasks.read().contains(task_path)
    }

    pub(crate) fn open_operation(
        &self,
        id: OperationId,
        parent: Option<OperationId>,
        task_path: Option<&str>,
    ) {
        if let Some(parent) = parent {
            self.parents.insert(id, parent);
        }
        if let Some(task_path) = task_path {
            self.task_paths.insert(id, task_path.to_string());
        }
    }

    pub(crate) fn close_operation(&self, id: OperationId) {
        self.parents.remove(&id);
        self.task_paths.remove(&id);
    }

    /// Number of operations currently tracked.
    #[must_use]
    pub fn open_operations(&self) -> usize {
        let mut ids: HashSet<OperationId> = self.parents.iter().map(|e| *e.key()).collect();
        ids.extend(self.task_paths.iter().map(|e| *e.key()));
        ids.len()
    }

    /// Task owning `id`: the operation itself or its closest task ancestor.
    ///
    /// The walk is bounded by the number of open operations so a corrupt
    /// parent chain cannot loop forever.
    #[must_use]
    pub fn owning_task(&self, id: OperationId) -> Option<String> {
        let mut current = id;
        for _ in 0..=self.parents.len() {
            if let Some(path) = self.task_paths.get(&current) {
                return Some(path.value().clone());
            }
            current = *self.parents.get(&current)?.value();
        }
        None
    }

    /// Record cache metadata for a task, replacing any earlier entry.
    pub fn record_cache_metadata(&self, task_path: impl Into<String>, metadata: TaskCacheMetadata) {
        self.cache_metadata.insert(task_path.into(), metadata);
    }

    /// Pending cache metadata for a task.
    #[must_use]
    pub fn cache_metadata(&self, task_path: &str) -> Option<TaskCacheMetadata> {
        self.cache_metadata.get(task_path).map(|e| e.value().clone())
    }

    /// Remove and return the pending cache metadata for a task.
    pub fn take_cache_metadata(&self, task_path: &str) -> Option<TaskCacheMetadata> {
        self.cache_metadata.remove(task_path).map(|(_, m)| m)
    }

    /// Claim `task_path` for reporting.
    ///
    /// Returns `false` when the task was already reported.
    pub fn claim_task(&self, task_path: &str) -> bool {
        self.reported.insert(task_path.to_string())
    }

    /// Append a finished task.
    pub fn push_outcome(&self, outcome: TaskOutcomeData) {
        self.outcomes.lock().push(outcome);
    }

    /// Snapshot of all finished tasks in completion order.
    #[must_use]
    pub fn outcomes(&self) -> Vec<TaskOutcomeData> {
        self.outcomes.lock().clone()
    }

    /// Mark the build as failed.
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    /// Whether any task failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}
