//! Build-scoped insights service
//!
//! Created when the build starts and closed when it ends. Closing sends the
//! report once; whatever goes wrong, a panic included, is logged as a single
//! warning and never reaches the build.

use crate::environment::{BuildEnvironment, SystemEnvironment};
use crate::operations::OperationTracker;
use crate::report::{BuildReportRequest, BuildReportResponse, BuildSummary, report_url};
use crate::state::BuildState;
use crate::tasks::TaskOutcomeRecorder;
use crate::{Error, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use tuist_cache::{
    AuthenticatedClient, Error as CacheError, HttpTransport, ReqwestTransport, Request, Timeouts,
};
use tuist_core::{CommandConfigurationProvider, ConfigurationProvider, InsightsSettings};

const APPLICATION_JSON: &str = "application/json";

/// Collects task outcomes during a build and reports them at the end.
pub struct BuildInsightsService {
    settings: InsightsSettings,
    state: Arc<BuildState>,
    client: AuthenticatedClient,
    transport: Arc<dyn HttpTransport>,
    environment: Arc<dyn BuildEnvironment>,
    closed: AtomicBool,
}

impl BuildInsightsService {
    /// Create a service talking to the real CLI and server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cache`] if the HTTP client cannot be created.
    pub fn new(settings: InsightsSettings) -> Result<Self> {
        let provider = CommandConfigurationProvider::new(
            settings.full_handle.clone(),
            settings.tool_command(),
        )
        .with_url(Some(settings.server_url.clone()));
        let transport = ReqwestTransport::new(Timeouts::REPORT)?;
        Ok(Self::with_components(
            settings,
            Arc::new(BuildState::new()),
            Arc::new(provider),
            Arc::new(transport),
            Arc::new(SystemEnvironment::default()),
        ))
    }

    /// Create a service from explicit parts.
    #[must_use]
    pub fn with_components(
        settings: InsightsSettings,
        state: Arc<BuildState>,
        provider: Arc<dyn ConfigurationProvider>,
        transport: Arc<dyn HttpTransport>,
        environment: Arc<dyn BuildEnvironment>,
    ) -> Self {
        Self {
            settings,
            state,
            client: AuthenticatedClient::new(provider),
            transport,
            environment,
            closed: AtomicBool::new(false),
        }
    }

    /// State shared with the listeners.
    #[must_use]
    pub fn state(&self) -> &Arc<BuildState> {
        &self.state
    }

    /// Listener for the low-level operation stream.
    #[must_use]
    pub fn operation_listener(&self) -> OperationTracker {
        OperationTracker::new(Arc::clone(&self.state))
    }

    /// Listener for task completions.
    #[must_use]
    pub fn task_listener(&self) -> TaskOutcomeRecorder {
        TaskOutcomeRecorder::new(Arc::clone(&self.state))
    }

    /// Register tasks the host declares cacheable.
    pub fn set_cacheable_tasks<I, S>(&self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.set_cacheable_tasks(paths);
    }

    /// Assemble the report from everything recorded so far.
    #[must_use]
    pub fn build_report(&self) -> BuildReportRequest {
        let summary = BuildSummary {
            duration_ms: u64::try_from(self.state.elapsed().as_millis()).unwrap_or(u64::MAX),
            failed: self.state.is_failed(),
            gradle_version: self.settings.gradle_version.clone(),
            java_version: self.settings.java_version.clone(),
            root_project_name: self.settings.root_project_name.clone(),
            is_ci: self.environment.is_ci(),
            git: self.environment.git_info(),
        };
        BuildReportRequest::assemble(summary, self.state.outcomes())
    }

    /// Send the report. Only the first call does anything.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.send_report())) {
            Ok(Ok(response)) => {
                info!(build = %response.id, "Tuist: Build insights reported successfully");
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Tuist: Warning - Failed to send build insights");
            }
            Err(payload) => {
                let panic_msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(
                    error = %panic_msg,
                    "Tuist: Warning - Failed to send build insights"
                );
            }
        }
    }

    /// Assemble and upload the report.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidHandle`] when the handle is not `account/project`
    /// - [`Error::ConfigurationUnavailable`] without credentials
    /// - [`Error::ReportRejected`] for any status but 201
    /// - [`Error::Cache`] for transport failures and a second 401
    pub fn send_report(&self) -> Result<BuildReportResponse> {
        let (account, project) = self.settings.handles().ok_or_else(|| Error::InvalidHandle {
            handle: self.settings.full_handle.clone(),
        })?;
        let url = report_url(&self.settings.server_url, account, project)?;
        let report = self.build_report();
        let body = serde_json::to_vec(&report)?;
        debug!(url = %url, tasks = report.tasks.len(), "Sending build report");

        let response = self.client.execute(|config| {
            let response = self.transport.send(Request::post(
                url.clone(),
                config.token.clone(),
                APPLICATION_JSON,
                body.clone(),
            ))?;
            if response.status == 401 {
                return Err(CacheError::TokenExpired);
            }
            Ok(response)
        })?;

        if response.status != 201 {
            return Err(Error::ReportRejected {
                status: response.status,
            });
        }
        let bytes = response.into_bytes()?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl Drop for BuildInsightsService {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for BuildInsightsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildInsightsService")
            .field("full_handle", &self.settings.full_handle)
            .field("server_url", &self.settings.server_url)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
