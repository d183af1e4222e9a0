//! HTTP content source tests against a mock CMS

mod common;

use common::{course_key, fast_options, site};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use schemagate::error::{Error, SchemaGateErrorTrait};
use schemagate::router::EndpointLayout;
use schemagate::service::SchemaService;
use schemagate::upstream::{ContentSource, HttpContentSource};
use schemagate::utils::error::UpstreamError;

fn course_json(id: &str, version: u64) -> serde_json::Value {
    json!({
        "id": id,
        "type": "Course",
        "version": version,
        "fields": {
            "name": format!("Course {id}"),
            "description": "Learn things"
        }
    })
}

fn source_for(server: &MockServer, timeout: Duration) -> HttpContentSource {
    let base = Url::parse(&format!("{}/api", server.uri())).unwrap();
    HttpContentSource::with_config(base, timeout, 1000).unwrap()
}

fn service_for(server: &MockServer) -> SchemaService {
    let source = source_for(server, Duration::from_secs(2));
    SchemaService::new(site(), EndpointLayout::default(), Arc::new(source))
        .with_options(fast_options())
}

#[tokio::test]
async fn test_fetch_entity() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/entities/course/course-1"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(course_json("course-1", 3)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = source_for(&mock_server, Duration::from_secs(2));
    let entity = source.fetch(&course_key("course-1")).await.unwrap();

    assert_eq!(entity.id, "course-1");
    assert_eq!(entity.version, 3);
    assert_eq!(entity.fields["name"], "Course course-1");
}

#[tokio::test]
async fn test_fetch_404_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let source = source_for(&mock_server, Duration::from_secs(2));
    let result = source.fetch(&course_key("gone")).await;

    assert!(matches!(result, Err(UpstreamError::NotFound(_))));
}

#[tokio::test]
async fn test_fetch_status_mapping() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/entities/course/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/entities/course/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/entities/course/private"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    let source = source_for(&mock_server, Duration::from_secs(2));

    let busy = source.fetch(&course_key("busy")).await.unwrap_err();
    assert!(matches!(busy, UpstreamError::RateLimit));
    assert!(busy.is_recoverable());

    let broken = source.fetch(&course_key("broken")).await.unwrap_err();
    assert!(matches!(broken, UpstreamError::Server(503)));
    assert!(broken.is_recoverable());

    let private = source.fetch(&course_key("private")).await.unwrap_err();
    assert!(matches!(private, UpstreamError::Status(403)));
    assert!(!private.is_recoverable());
}

#[tokio::test]
async fn test_fetch_malformed_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&mock_server)
        .await;

    let source = source_for(&mock_server, Duration::from_secs(2));
    let err = source.fetch(&course_key("c1")).await.unwrap_err();

    match err {
        UpstreamError::Decode(message) => assert!(message.contains("not json")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_fetch_wrong_entity() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(course_json("other", 1)))
        .mount(&mock_server)
        .await;

    let source = source_for(&mock_server, Duration::from_secs(2));
    let err = source.fetch(&course_key("c1")).await.unwrap_err();

    assert!(matches!(err, UpstreamError::WrongEntity { .. }));
}

#[tokio::test]
async fn test_fetch_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(course_json("slow", 1))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;

    let source = source_for(&mock_server, Duration::from_millis(100));
    let err = source.fetch(&course_key("slow")).await.unwrap_err();

    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_refresh_retries_server_errors() {
    let mock_server = MockServer::start().await;

    // First two requests fail
    Mock::given(method("GET"))
        .and(path("/api/entities/course/c1"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    // Third request succeeds
    Mock::given(method("GET"))
        .and(path("/api/entities/course/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(course_json("c1", 1)))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let outcome = service.refresh(&course_key("c1")).await.unwrap();

    assert!(!outcome.is_fallback());
    assert_eq!(outcome.document().version, 1);
}

#[tokio::test]
async fn test_refresh_does_not_retry_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let err = service.refresh(&course_key("c1")).await.unwrap_err();

    assert!(matches!(err, Error::Upstream(UpstreamError::NotFound(_))));
    assert_eq!(err.status_code().as_u16(), 404);
}

#[tokio::test]
async fn test_lazy_document_fetch_timeout_is_gateway_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(course_json("c1", 1))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let err = service.document(&course_key("c1")).await.unwrap_err();

    assert_eq!(err.status_code().as_u16(), 504);
    assert!(service.cache().is_empty());
}

#[tokio::test]
async fn test_lazy_document_fetch_caches() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/entities/course/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(course_json("c1", 4)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let first = service.document(&course_key("c1")).await.unwrap();
    let second = service.document(&course_key("c1")).await.unwrap();

    assert_eq!(first.version, 4);
    assert_eq!(first.content_hash, second.content_hash);
}
