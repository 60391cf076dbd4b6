//! Scrolling search backend tests against a mock search index.

use bmpredict_lib::core::{ConfigBuilder, PredictError, PredictorKind, QueryWindow, SearchConfig};
use bmpredict_lib::storage::{SearchBackend, TimeSeriesBackend};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ops(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn search_config(page_size: usize) -> SearchConfig {
    let mut config = ConfigBuilder::new()
        .url("http://unused")
        .strategy(PredictorKind::Simple)
        .search_index("watchtower-test*")
        .build()
        .unwrap()
        .storage
        .search;
    config.page_size = page_size;
    config.scroll_keep_alive = Duration::from_secs(60);
    config
}

fn hit(timestamp: i64, values: Value) -> Value {
    json!({ "_source": { "timestamp": timestamp, "Values": values } })
}

fn page(scroll_id: &str, total: Value, hits: Vec<Value>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "_scroll_id": scroll_id,
        "hits": { "total": total, "hits": hits }
    }))
}

async fn mount_first_page(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/_search"))
        .and(query_param("scroll", "60s"))
        .and(query_param("size", "2"))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_scroll_page(server: &MockServer, scroll_id: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/_search/scroll"))
        .and(query_param("scroll", "60s"))
        .and(body_partial_json(json!({ "scroll": "60s", "scroll_id": scroll_id })))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn expect_clear(server: &MockServer, scroll_id: &str) {
    Mock::given(method("DELETE"))
        .and(path("/_search/scroll"))
        .and(body_partial_json(json!({ "scroll_id": [scroll_id] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "succeeded": true })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_merges_pages_in_order() {
    let server = MockServer::start().await;
    mount_first_page(
        &server,
        page(
            "cursor-1",
            json!(5),
            vec![
                hit(100, json!({ "get": 10, "put": 20 })),
                hit(200, json!({ "get": 11, "put": 21 })),
            ],
        ),
    )
    .await;
    mount_scroll_page(
        &server,
        "cursor-1",
        page(
            "cursor-2",
            json!({ "value": 5, "relation": "eq" }),
            vec![
                hit(300, json!({ "get": 12 })),
                hit(400, json!({ "get": 13, "put": 23 })),
            ],
        ),
    )
    .await;
    mount_scroll_page(
        &server,
        "cursor-2",
        page("cursor-2", json!(5), vec![hit(500, json!({ "get": 14, "put": 24 }))]),
    )
    .await;
    expect_clear(&server, "cursor-2").await;

    let backend = SearchBackend::new(server.uri(), &search_config(2), None).unwrap();
    let result = backend
        .query(&QueryWindow::default(), &ops(&["get", "put", "delete"]))
        .await
        .unwrap();

    assert_eq!(result["get"].len(), 5);
    assert_eq!(result["get"].values(), vec![10, 11, 12, 13, 14]);
    assert_eq!(
        result["get"].iter().map(|p| p.timestamp).collect::<Vec<_>>(),
        vec![100, 200, 300, 400, 500]
    );
    // A hit without a value contributes nothing to that operation
    assert_eq!(result["put"].values(), vec![20, 21, 23, 24]);
    assert!(result["delete"].is_empty());
}

#[tokio::test]
async fn test_truncates_after_assembly() {
    let server = MockServer::start().await;
    mount_first_page(
        &server,
        page(
            "c1",
            json!(3),
            vec![hit(1, json!({ "get": 1 })), hit(2, json!({ "get": 2 }))],
        ),
    )
    .await;
    mount_scroll_page(&server, "c1", page("c1", json!(3), vec![hit(3, json!({ "get": 3 }))])).await;

    let backend = SearchBackend::new(server.uri(), &search_config(2), None).unwrap();
    let result = backend
        .query(&QueryWindow::latest(2), &ops(&["get"]))
        .await
        .unwrap();
    assert_eq!(result["get"].values(), vec![2, 3]);
}

#[tokio::test]
async fn test_regression_across_pages_is_fatal() {
    let server = MockServer::start().await;
    mount_first_page(
        &server,
        page(
            "c1",
            json!(4),
            vec![hit(100, json!({ "get": 1 })), hit(300, json!({ "get": 2 }))],
        ),
    )
    .await;
    mount_scroll_page(
        &server,
        "c1",
        page(
            "c2",
            json!(4),
            vec![hit(250, json!({ "get": 3 })), hit(400, json!({ "get": 4 }))],
        ),
    )
    .await;
    // The failing page's cursor is still released
    expect_clear(&server, "c2").await;

    let backend = SearchBackend::new(server.uri(), &search_config(2), None).unwrap();
    let err = backend
        .query(&QueryWindow::default(), &ops(&["get"]))
        .await
        .unwrap_err();
    assert!(matches!(err, PredictError::Protocol(_)));
    assert!(err.to_string().contains("out of order"));
}

#[tokio::test]
async fn test_stalled_scroll_is_protocol_error() {
    let server = MockServer::start().await;
    mount_first_page(
        &server,
        page(
            "c1",
            json!(10),
            vec![hit(1, json!({ "get": 1 })), hit(2, json!({ "get": 2 }))],
        ),
    )
    .await;
    mount_scroll_page(&server, "c1", page("c1", json!(10), vec![])).await;
    expect_clear(&server, "c1").await;

    let backend = SearchBackend::new(server.uri(), &search_config(2), None).unwrap();
    let err = backend
        .query(&QueryWindow::default(), &ops(&["get"]))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "protocol");
    assert!(err.to_string().contains("2 of 10"));
}

#[tokio::test]
async fn test_first_page_failure_clears_cursor() {
    let server = MockServer::start().await;
    mount_first_page(
        &server,
        page(
            "c1",
            json!(4),
            vec![hit(9, json!({ "get": 1 })), hit(3, json!({ "get": 2 }))],
        ),
    )
    .await;
    expect_clear(&server, "c1").await;

    let backend = SearchBackend::new(server.uri(), &search_config(2), None).unwrap();
    let err = backend
        .query(&QueryWindow::default(), &ops(&["get"]))
        .await
        .unwrap_err();
    assert!(matches!(err, PredictError::Protocol(_)));
    server.verify().await;
}

#[tokio::test]
async fn test_range_query_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_search"))
        .and(body_partial_json(json!({
            "query": { "indices": {
                "indices": ["watchtower-test*"],
                "query": { "range": { "timestamp": { "gte": 100 } } }
            } },
            "sort": [{ "timestamp": { "order": "asc" } }],
            "filter": { "type": { "value": "appengine" } }
        })))
        .respond_with(page("c1", json!(1), vec![hit(150, json!({ "get": 7 }))]))
        .expect(1)
        .mount(&server)
        .await;

    let backend = SearchBackend::new(server.uri(), &search_config(2), None).unwrap();
    let window = QueryWindow::from_raw(0, 100, -1);
    let result = backend.query(&window, &ops(&["get"])).await.unwrap();
    assert_eq!(result["get"].values(), vec![7]);
}

#[tokio::test]
async fn test_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_search"))
        .respond_with(ResponseTemplate::new(500).set_body_string("shard failure"))
        .mount(&server)
        .await;

    let backend = SearchBackend::new(server.uri(), &search_config(2), None).unwrap();
    let err = backend
        .query(&QueryWindow::default(), &ops(&["get"]))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "network");
}
