//! Build insights for Tuist
//!
//! Two observers feed one [`BuildState`]:
//! - [`OperationTracker`] follows the host's operation tree and records, per
//!   task, whether its cache entry came from the local or the remote cache
//! - [`TaskOutcomeRecorder`] classifies every finished task
//!
//! At the end of the build [`BuildInsightsService::close`] uploads a
//! [`BuildReportRequest`]. Reporting is best effort and never fails a build.

mod error;
pub mod environment;
pub mod operations;
pub mod report;
pub mod service;
pub mod state;
pub mod tasks;

pub use environment::{BuildEnvironment, GitInfo, SystemEnvironment, is_ci};
pub use error::{Error, Result};
pub use operations::{
    BuildOperationListener, OperationDetails, OperationFinishEvent, OperationId, OperationResult,
    OperationStartEvent, OperationTracker,
};
pub use report::{BuildReportRequest, BuildReportResponse, BuildStatus, TaskReportEntry};
pub use service::BuildInsightsService;
pub use state::{BuildState, CacheHitType, TaskCacheMetadata};
pub use tasks::{
    TaskCompletionListener, TaskFinishEvent, TaskOutcome, TaskOutcomeData, TaskOutcomeRecorder,
    TaskResult,
};
