//! Paged API source tests against a mock HTTP server

use serde_json::json;
use std::time::{Duration, Instant};
use voterspheres_ingest::{ApiSourceConfig, PagedApiSource, PagedSource, SourceError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source_for(server: &MockServer) -> PagedApiSource {
    let config = ApiSourceConfig::new(server.uri())
        .with_per_page(2)
        .with_request_delay(Duration::ZERO);
    PagedApiSource::new(config).unwrap()
}

#[tokio::test]
async fn test_fetch_page_sends_paging_params_and_converts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/candidates"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"name": "Jane Doe", "office_full": "Governor", "state": "CA", "election_year": 2026},
                {"name": "Ann Lee", "office": "Mayor", "state": "tx", "website": "https://annlee.example"}
            ],
            "pagination": {"pages": 3}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = source_for(&server).fetch_page(1).await.unwrap();

    assert_eq!(page.total_pages, Some(3));
    assert_eq!(page.records.len(), 2);
    assert_eq!(page.records[0].slug(false), "jane-doe-ca-governor");
    assert_eq!(page.records[1].state, "TX");
    assert!(page.malformed.is_empty());
}

#[tokio::test]
async fn test_api_key_is_forwarded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/candidates"))
        .and(query_param("api_key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let config = ApiSourceConfig::new(server.uri())
        .with_api_key("secret")
        .with_request_delay(Duration::ZERO);
    let page = PagedApiSource::new(config)
        .unwrap()
        .fetch_page(1)
        .await
        .unwrap();

    assert!(page.records.is_empty());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = source_for(&server).fetch_page(1).await.unwrap_err();
    assert!(err.is_transient(), "got {:?}", err);
}

#[tokio::test]
async fn test_not_found_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = source_for(&server).fetch_page(1).await.unwrap_err();
    assert!(matches!(err, SourceError::Rejected(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_garbage_body_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = source_for(&server).fetch_page(1).await.unwrap_err();
    assert!(matches!(err, SourceError::MalformedResponse(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_request_delay_spaces_requests() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;

    let config =
        ApiSourceConfig::new(server.uri()).with_request_delay(Duration::from_millis(150));
    let source = PagedApiSource::new(config).unwrap();

    let started = Instant::now();
    source.fetch_page(1).await.unwrap();
    source.fetch_page(2).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(150));
}
