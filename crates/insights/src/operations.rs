//! Attribution of low-level build operations to tasks
//!
//! The host emits a tree of operations. Cache loads and packs happen in
//! operations nested somewhere below the task that needs them, and only
//! their results say whether the entry came from the local or the remote
//! cache. [`OperationTracker`] keeps just enough of the open tree to find
//! the owning task when such an operation finishes.

use crate::state::{BuildState, CacheHitType, TaskCacheMetadata};
use std::sync::Arc;
use tracing::debug;

/// Identifier of a build operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub u64);

/// What an operation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationDetails {
    /// Execution of a task
    ExecuteTask {
        /// Path of the task (e.g. `:app:compileKotlin`)
        task_path: String,
    },
    /// Lookup of a cache entry
    LoadCacheEntry {
        /// Key of the entry
        cache_key: String,
    },
    /// Packing of outputs into a cache entry
    PackCacheEntry {
        /// Key of the entry
        cache_key: String,
    },
    /// Anything else
    Other,
}

impl OperationDetails {
    /// Task path for task-execution operations.
    #[must_use]
    pub fn task_path(&self) -> Option<&str> {
        match self {
            Self::ExecuteTask { task_path } => Some(task_path),
            _ => None,
        }
    }

    /// Cache key for cache operations.
    #[must_use]
    pub fn cache_key(&self) -> Option<&str> {
        match self {
            Self::LoadCacheEntry { cache_key } | Self::PackCacheEntry { cache_key } => {
                Some(cache_key)
            }
            _ => None,
        }
    }
}

/// How an operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Local build cache lookup
    LocalLoad {
        /// Whether the entry was found
        hit: bool,
        /// Size of the loaded archive
        archive_size: Option<u64>,
    },
    /// Remote build cache lookup
    RemoteLoad {
        /// Whether the entry was found
        hit: bool,
        /// Size of the loaded archive
        archive_size: Option<u64>,
    },
    /// Outputs packed for storing
    Pack {
        /// Size of the packed archive
        archive_size: Option<u64>,
    },
    /// Anything else
    Other,
}

impl OperationResult {
    /// Provenance and archive size for cache results.
    #[must_use]
    pub const fn cache_activity(&self) -> Option<(CacheHitType, Option<u64>)> {
        match *self {
            Self::LocalLoad {
                hit: true,
                archive_size,
            } => Some((CacheHitType::Local, archive_size)),
            Self::RemoteLoad {
                hit: true,
                archive_size,
            } => Some((CacheHitType::Remote, archive_size)),
            Self::LocalLoad {
                hit: false,
                archive_size,
            }
            | Self::RemoteLoad {
                hit: false,
                archive_size,
            }
            | Self::Pack { archive_size } => Some((CacheHitType::Miss, archive_size)),
            Self::Other => None,
        }
    }
}

/// An operation started.
#[derive(Debug, Clone)]
pub struct OperationStartEvent {
    /// Operation identifier
    pub id: OperationId,
    /// Enclosing operation
    pub parent: Option<OperationId>,
    /// Operation payload
    pub details: OperationDetails,
}

/// An operation finished.
#[derive(Debug, Clone)]
pub struct OperationFinishEvent {
    /// Operation identifier
    pub id: OperationId,
    /// Operation payload
    pub details: OperationDetails,
    /// Operation result
    pub result: OperationResult,
}

/// Observer of the host's low-level operation stream.
///
/// Callbacks may arrive concurrently from any build worker.
pub trait BuildOperationListener: Send + Sync {
    /// An operation started.
    fn started(&self, event: &OperationStartEvent);

    /// An operation finished.
    fn finished(&self, event: &OperationFinishEvent);
}

/// Records cache provenance per task into a [`BuildState`].
#[derive(Debug, Clone)]
pub struct OperationTracker {
    state: Arc<BuildState>,
}

impl OperationTracker {
    /// Track operations into `state`.
    #[must_use]
    pub const fn new(state: Arc<BuildState>) -> Self {
        Self { state }
    }
}

impl BuildOperationListener for OperationTracker {
    fn started(&self, event: &OperationStartEvent) {
        self.state
            .open_operation(event.id, event.parent, event.details.task_path());
    }

    fn finished(&self, event: &OperationFinishEvent) {
        if let Some((hit_type, artifact_size)) = event.result.cache_activity() {
            match self.state.owning_task(event.id) {
                Some(task_path) => {
                    debug!(
                        task = %task_path,
                        hit_type = ?hit_type,
                        cache_key = event.details.cache_key().unwrap_or_default(),
                        "Attributed cache operation"
                    );
                    self.state.record_cache_metadata(
                        task_path,
                        TaskCacheMetadata {
                            cache_key: event.details.cache_key().map(str::to_string),
                            artifact_size,
                            hit_type,
                        },
                    );
                }
                None => debug!(operation = event.id.0, "Cache operation without owning task"),
            }
        }
        self.state.close_operation(event.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_activity() {
        let local = OperationResult::LocalLoad {
            hit: true,
            archive_size: Some(5),
        };
        assert_eq!(local.cache_activity(), Some((CacheHitType::Local, Some(5))));

        let remote_miss = OperationResult::RemoteLoad {
            hit: false,
            archive_size: None,
        };
        assert_eq!(remote_miss.cache_activity(), Some((CacheHitType::Miss, None)));

        let pack = OperationResult::Pack {
            archive_size: Some(9),
        };
        assert_eq!(pack.cache_activity(), Some((CacheHitType::Miss, Some(9))));
        assert_eq!(OperationResult::Other.cache_activity(), None);
    }

    #[test]
    fn test_details_accessors() {
        let task = OperationDetails::ExecuteTask {
            task_path: ":a".to_string(),
        };
        assert_eq!(task.task_path(), Some(":a"));
        assert_eq!(task.cache_key(), None);

        let load = OperationDetails::LoadCacheEntry {
            cache_key: "k".to_string(),
        };
        assert_eq!(load.cache_key(), Some("k"));
        assert_eq!(load.task_path(), None);
    }
}
