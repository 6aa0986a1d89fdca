//! HTTP-level tests for the Supabase adapter
//!
//! Tests cover:
//! - Authentication headers on every request
//! - Row pagination until an empty page, including server-capped pages
//! - Full-table delete filter and Content-Range count
//! - Batched inserts
//! - Recursive bucket listing
//! - Unavailable classification for ping

use creel_core::config::StoreConfig;
use creel_store::{ObjectStore, StoreError, SupabaseStore, TableStore};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "service-role-test-key";

fn store_with(server: &MockServer, page_size: usize, insert_batch_size: usize) -> SupabaseStore {
    let config = StoreConfig {
        url: Some(server.uri()),
        service_key: Some(KEY.to_string()),
        page_size,
        insert_batch_size,
        ..StoreConfig::default()
    };
    SupabaseStore::from_config(&config).unwrap()
}

fn rows(range: std::ops::Range<u64>) -> Vec<Value> {
    range.map(|id| json!({"id": id, "name": format!("row {}", id)})).collect()
}

#[tokio::test]
async fn test_ping_sends_auth_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .and(header("apikey", KEY))
        .and(header("authorization", format!("Bearer {}", KEY).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(&server, 1000, 500);
    store.ping().await.unwrap();
}

#[tokio::test]
async fn test_ping_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = store_with(&server, 1000, 500);
    let err = store.ping().await.unwrap_err();
    assert!(err.is_unavailable(), "got {:?}", err);
}

#[tokio::test]
async fn test_ping_unreachable_host_is_unavailable() {
    let server = MockServer::start().await;
    let store = store_with(&server, 1000, 500);
    drop(server);

    let err = store.ping().await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
}

#[tokio::test]
async fn test_fetch_rows_paginates_until_empty_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/records"))
        .and(query_param("select", "*"))
        .and(query_param("limit", "2"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows(0..2)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/records"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows(2..4)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/records"))
        .and(query_param("offset", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows(4..5)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/records"))
        .and(query_param("offset", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(&server, 2, 500);
    let fetched = store.fetch_rows("records").await.unwrap();
    assert_eq!(fetched, rows(0..5));
}

#[tokio::test]
async fn test_fetch_rows_survives_server_row_cap() {
    let server = MockServer::start().await;
    // db-max-rows of 2 on the server, page size of 3 on the client
    for (offset, body) in [(0u64, rows(0..2)), (2, rows(2..4)), (4, rows(4..5)), (5, vec![])] {
        Mock::given(method("GET"))
            .and(path("/rest/v1/records"))
            .and(query_param("limit", "3"))
            .and(query_param("offset", offset.to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let store = store_with(&server, 3, 500);
    let fetched = store.fetch_rows("records").await.unwrap();
    assert_eq!(fetched.len(), 5);
    assert_eq!(fetched, rows(0..5));
}

#[tokio::test]
async fn test_fetch_rows_surfaces_postgrest_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": "42P01",
            "message": "relation \"public.ghost\" does not exist"
        })))
        .mount(&server)
        .await;

    let store = store_with(&server, 1000, 500);
    match store.fetch_rows("ghost").await.unwrap_err() {
        StoreError::Request { status, message } => {
            assert_eq!(status, 404);
            assert!(message.contains("does not exist"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_rows_invalid_json_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/records"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let store = store_with(&server, 1000, 500);
    assert!(matches!(
        store.fetch_rows("records").await,
        Err(StoreError::Decode(_))
    ));
}

#[tokio::test]
async fn test_delete_all_uses_filter_and_reads_count() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/records"))
        .and(query_param("id", "not.is.null"))
        .and(header_regex("prefer", "count=exact"))
        .respond_with(ResponseTemplate::new(204).insert_header("content-range", "*/7"))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(&server, 1000, 500);
    assert_eq!(store.delete_all("records").await.unwrap(), 7);
}

#[tokio::test]
async fn test_insert_rows_in_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/records"))
        .and(header_regex("prefer", "return=minimal"))
        .respond_with(ResponseTemplate::new(201))
        .expect(3)
        .mount(&server)
        .await;

    let store = store_with(&server, 1000, 2);
    assert_eq!(store.insert_rows("records", &rows(0..5)).await.unwrap(), 5);
}

#[tokio::test]
async fn test_insert_empty_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let store = store_with(&server, 1000, 2);
    assert_eq!(store.insert_rows("records", &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_insert_conflict_is_request_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/records"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "duplicate key value"})),
        )
        .mount(&server)
        .await;

    let store = store_with(&server, 1000, 500);
    let err = store.insert_rows("records", &rows(0..1)).await.unwrap_err();
    assert!(matches!(err, StoreError::Request { status: 409, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_list_objects_descends_into_folders() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/list/avatars"))
        .and(body_partial_json(json!({"prefix": ""})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "user-1", "id": null, "metadata": null},
            {"name": "default.png", "id": "obj-0", "metadata": {"size": 512}}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/list/avatars"))
        .and(body_partial_json(json!({"prefix": "user-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "me.jpg", "id": "obj-1", "metadata": {"size": 2048, "mimetype": "image/jpeg"}}
        ])))
        .mount(&server)
        .await;

    let store = store_with(&server, 1000, 500);
    let objects = store.list_objects("avatars", None).await.unwrap();

    let names: Vec<_> = objects.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["default.png", "user-1/me.jpg"]);
    assert_eq!(objects[1].size, Some(2048));
    assert_eq!(objects[1].attributes["id"], "obj-1");
}

#[tokio::test]
async fn test_list_objects_missing_bucket() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/list/thumbnails"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "Bucket not found"})),
        )
        .mount(&server)
        .await;

    let store = store_with(&server, 1000, 500);
    let err = store.list_objects("thumbnails", None).await.unwrap_err();
    assert!(err.to_string().contains("Bucket not found"));
}
