//! Build report submission against an in-memory server

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::Utc;
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tuist_cache::{Error as CacheError, HttpTransport, Request, Response};
use tuist_core::{CacheConfiguration, ConfigurationProvider, InsightsSettings};
use tuist_insights::{
    BuildEnvironment, BuildInsightsService, BuildReportRequest, BuildState, BuildStatus, Error,
    GitInfo, TaskCompletionListener, TaskFinishEvent, TaskOutcome, TaskResult,
};

type Handler = dyn Fn(&Request) -> tuist_cache::Result<Response> + Send + Sync;

struct FakeServer {
    requests: Mutex<Vec<Request>>,
    handler: Box<Handler>,
}

impl FakeServer {
    fn new(
        handler: impl Fn(&Request) -> tuist_cache::Result<Response> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        })
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }
}

impl HttpTransport for FakeServer {
    fn send(&self, request: Request) -> tuist_cache::Result<Response> {
        let response = (self.handler)(&request);
        self.requests.lock().push(request);
        response
    }
}

#[derive(Default)]
struct TokenProvider {
    calls: AtomicUsize,
    unavailable: bool,
}

impl ConfigurationProvider for TokenProvider {
    fn configuration(&self, _force_refresh: bool) -> Option<CacheConfiguration> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.unavailable {
            return None;
        }
        Some(CacheConfiguration {
            url: "https://cache.tuist.dev".to_string(),
            token: format!("token-{n}").into(),
            account_handle: "acme".to_string(),
            project_handle: "app".to_string(),
        })
    }
}

struct FixedEnvironment;

impl BuildEnvironment for FixedEnvironment {
    fn is_ci(&self) -> bool {
        true
    }

    fn git_info(&self) -> GitInfo {
        GitInfo {
            branch: Some("main".to_string()),
            commit_sha: Some("0123abcd".to_string()),
            git_ref: Some("v1.2.0".to_string()),
        }
    }
}

/// Counts WARN events.
#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn settings(handle: &str) -> InsightsSettings {
    InsightsSettings {
        full_handle: handle.to_string(),
        gradle_version: Some("8.10".to_string()),
        java_version: Some("21.0.4".to_string()),
        root_project_name: Some("app".to_string()),
        ..InsightsSettings::default()
    }
}

fn service(
    handle: &str,
    provider: Arc<TokenProvider>,
    server: Arc<FakeServer>,
) -> BuildInsightsService {
    BuildInsightsService::with_components(
        settings(handle),
        Arc::new(BuildState::new()),
        provider,
        server,
        Arc::new(FixedEnvironment),
    )
}

fn record(service: &BuildInsightsService, path: &str, result: TaskResult) {
    let now = Utc::now();
    service.task_listener().on_task_finished(&TaskFinishEvent {
        task_path: path.to_string(),
        task_type: None,
        start_time: now,
        end_time: now + chrono::Duration::milliseconds(40),
        result,
    });
}

#[test]
fn test_report_is_posted_once() {
    let server = FakeServer::new(|_| Ok(Response::from_bytes(201, br#"{"id":"build-42"}"#.to_vec())));
    let svc = service("acme/app", Arc::new(TokenProvider::default()), server.clone());
    record(
        &svc,
        ":app:compileKotlin",
        TaskResult::Success {
            from_cache: false,
            up_to_date: true,
        },
    );

    let response = svc.send_report().unwrap();
    assert_eq!(response.id, "build-42");

    let requests = server.requests();
    let request = &requests[0];
    assert_eq!(
        request.url.as_str(),
        "https://tuist.dev/api/projects/acme/app/gradle/builds"
    );
    assert_eq!(request.bearer_token.expose_secret(), "token-1");
    assert_eq!(request.content_type, Some("application/json"));

    let body = request.body.as_ref().unwrap().to_bytes().unwrap();
    let report: BuildReportRequest = serde_json::from_slice(&body).unwrap();
    assert_eq!(report.status, BuildStatus::Success);
    assert_eq!(report.gradle_version.as_deref(), Some("8.10"));
    assert_eq!(report.java_version.as_deref(), Some("21.0.4"));
    assert_eq!(report.root_project_name.as_deref(), Some("app"));
    assert!(report.is_ci);
    assert_eq!(report.git_branch.as_deref(), Some("main"));
    assert_eq!(report.git_commit_sha.as_deref(), Some("0123abcd"));
    assert_eq!(report.git_ref.as_deref(), Some("v1.2.0"));
    assert_eq!(report.avoidance_savings_ms, 40);
    assert_eq!(report.tasks.len(), 1);
    assert_eq!(report.tasks[0].outcome, TaskOutcome::UpToDate);
}

#[test]
fn test_close_runs_once() {
    let server = FakeServer::new(|_| Ok(Response::from_bytes(201, br#"{"id":"b"}"#.to_vec())));
    let svc = service("acme/app", Arc::new(TokenProvider::default()), server.clone());

    svc.close();
    svc.close();
    drop(svc);

    assert_eq!(server.requests().len(), 1);
}

#[test]
fn test_failed_build_status() {
    let server = FakeServer::new(|_| Ok(Response::from_bytes(201, br#"{"id":"b"}"#.to_vec())));
    let svc = service("acme/app", Arc::new(TokenProvider::default()), server);
    record(&svc, ":app:test", TaskResult::Failure);

    assert_eq!(svc.build_report().status, BuildStatus::Failure);
}

#[test]
fn test_report_retries_after_401() {
    let server = FakeServer::new(|request| {
        if request.bearer_token.expose_secret() == "token-1" {
            Ok(Response::empty(401))
        } else {
            Ok(Response::from_bytes(201, br#"{"id":"b"}"#.to_vec()))
        }
    });
    let svc = service("acme/app", Arc::new(TokenProvider::default()), server.clone());

    assert_eq!(svc.send_report().unwrap().id, "b");
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    let bodies: Vec<_> = requests
        .iter()
        .map(|r| r.body.as_ref().unwrap().to_bytes().unwrap())
        .collect();
    assert_eq!(bodies[0], bodies[1]);
}

#[test]
fn test_rejected_report() {
    let server = FakeServer::new(|_| Ok(Response::empty(422)));
    let svc = service("acme/app", Arc::new(TokenProvider::default()), server);

    assert!(matches!(
        svc.send_report(),
        Err(Error::ReportRejected { status: 422 })
    ));
}

#[test]
fn test_invalid_handle_sends_nothing() {
    let server = FakeServer::new(|_| Ok(Response::empty(201)));
    let provider = Arc::new(TokenProvider::default());
    let svc = service("not-a-handle", provider.clone(), server.clone());

    assert!(matches!(svc.send_report(), Err(Error::InvalidHandle { .. })));
    assert!(server.requests().is_empty());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unavailable_configuration() {
    let server = FakeServer::new(|_| Ok(Response::empty(201)));
    let provider = Arc::new(TokenProvider {
        unavailable: true,
        ..TokenProvider::default()
    });
    let svc = service("acme/app", provider, server.clone());

    assert!(matches!(
        svc.send_report(),
        Err(Error::ConfigurationUnavailable)
    ));
    assert!(server.requests().is_empty());
}

#[test]
fn test_close_swallows_failures_with_one_warning() {
    let cases: Vec<(&str, Arc<FakeServer>)> = vec![
        (
            "acme/app",
            FakeServer::new(|_| Err(CacheError::transport("connection reset"))),
        ),
        ("acme/app", FakeServer::new(|_| Ok(Response::empty(500)))),
        (
            "acme/app",
            FakeServer::new(|_| Ok(Response::from_bytes(201, b"not json".to_vec()))),
        ),
        ("acme", FakeServer::new(|_| Ok(Response::empty(201)))),
    ];

    for (handle, server) in cases {
        let warnings = WarnCounter::default();
        let subscriber = tracing_subscriber::registry().with(warnings.clone());

        tracing::subscriber::with_default(subscriber, || {
            let svc = service(handle, Arc::new(TokenProvider::default()), server);
            svc.close();
        });

        assert_eq!(warnings.0.load(Ordering::SeqCst), 1, "handle {handle}");
    }
}

#[test]
fn test_panicking_transport_is_contained() {
    let warnings = WarnCounter::default();
    let subscriber = tracing_subscriber::registry().with(warnings.clone());

    tracing::subscriber::with_default(subscriber, || {
        let server = FakeServer::new(|_| panic!("transport used on the wrong thread"));
        let svc = service("acme/app", Arc::new(TokenProvider::default()), server);
        // Dropping without an explicit close goes through the same path
        drop(svc);
    });

    assert_eq!(warnings.0.load(Ordering::SeqCst), 1);
}
