//! End-to-end requests through the reqwest transport

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use tuist_cache::{
    AuthenticatedClient, BuildCacheKey, BuildCacheService, ReqwestTransport, Timeouts,
    TuistBuildCacheService,
};
use tuist_core::{CacheConfiguration, ConfigurationProvider};
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct StaticProvider(String);

impl ConfigurationProvider for StaticProvider {
    fn configuration(&self, _force_refresh: bool) -> Option<CacheConfiguration> {
        Some(CacheConfiguration {
            url: self.0.clone(),
            token: "secret".into(),
            account_handle: "acme".to_string(),
            project_handle: "app".to_string(),
        })
    }
}

fn service_for(uri: String) -> TuistBuildCacheService {
    let client = AuthenticatedClient::new(Arc::new(StaticProvider(uri)));
    let transport = ReqwestTransport::new(Timeouts::CACHE).unwrap();
    TuistBuildCacheService::new(Arc::new(client), Arc::new(transport))
        .with_push(true)
        .with_insecure_protocol(true)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_load_and_store_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/cache/gradle/abc123"))
        .and(query_param("account_handle", "acme"))
        .and(query_param("project_handle", "app"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"cached-output".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/cache/gradle/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/api/cache/gradle/abc123"))
        .and(header("content-type", "application/octet-stream"))
        .and(body_bytes(b"new-output".to_vec()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    // The blocking client must be created, used and dropped off the runtime
    let (hit, body, miss) = tokio::task::spawn_blocking(move || {
        let service = service_for(uri);
        let mut body = Vec::<u8>::new();
        let hit = service
            .load(&BuildCacheKey::new("abc123"), &mut body)
            .unwrap();
        let miss = service
            .load(&BuildCacheKey::new("missing"), &mut Vec::<u8>::new())
            .unwrap();
        service
            .store(&BuildCacheKey::new("abc123"), &b"new-output".to_vec())
            .unwrap();
        (hit, body, miss)
    })
    .await
    .unwrap();

    assert!(hit);
    assert_eq!(body, b"cached-output");
    assert!(!miss);
}
