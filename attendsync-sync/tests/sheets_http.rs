//! SheetsStore and the full pipeline against mock upstream + Sheets APIs.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use attendsync_core::{FailureKind, SourceConfig, StoreConfig, TimeWindow};
use attendsync_sync::{
    append_new, ensure_header, pipeline, FetchQuery, HttpRecordSource, RecordStore, SheetsStore,
    StoreError, COLUMNS,
};

const VALUES: &str = "/v4/spreadsheets/sheet-1/values";

fn store(api_base: &str) -> Arc<SheetsStore> {
    Arc::new(SheetsStore::new(&StoreConfig {
        spreadsheet_id: "sheet-1".into(),
        sheet_name: "Sheet1".into(),
        access_token: "ya29.token".into(),
        api_base: api_base.into(),
        ..StoreConfig::default()
    }))
}

async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.expect("join")
}

fn record(uid: &str) -> attendsync_core::AttendanceRecord {
    attendsync_core::AttendanceRecord {
        uid: uid.into(),
        sync_time: "2024-05-01T08:00:05Z".into(),
        logged_time: "2024-05-01T08:00:00Z".into(),
        kind: attendsync_core::AttendanceType::Face,
        device_id: "gate".into(),
        person_id: "emp".into(),
        rfid: String::new(),
        location: String::new(),
        primary_display_text: String::new(),
        secondary_display_text: String::new(),
        project: Default::default(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn read_keys_uses_the_uid_column() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{VALUES}/Sheet1!A2:A")))
        .and(query_param("majorDimension", "COLUMNS"))
        .and(header("Authorization", "Bearer ya29.token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Sheet1!A2:A1000",
            "majorDimension": "COLUMNS",
            "values": [["a", "", "b", 42]],
        })))
        .mount(&server)
        .await;

    let store = store(&server.uri());
    let keys = blocking(move || store.read_keys()).await.unwrap();
    assert_eq!(keys, ["a", "b", "42"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_sheet_has_no_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{VALUES}/Sheet1!A2:A")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "range": "Sheet1!A2:A" })))
        .mount(&server)
        .await;

    let store = store(&server.uri());
    assert!(blocking(move || store.read_keys()).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn append_new_only_posts_unseen_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{VALUES}/Sheet1!A2:A")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["a", "b"]],
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{VALUES}/Sheet1!A:M:append")))
        .and(query_param("valueInputOption", "RAW"))
        .and(query_param("insertDataOption", "INSERT_ROWS"))
        .and(body_partial_json(json!({
            "values": [["c", "2024-05-01T08:00:05Z", "2024-05-01T08:00:00Z", "face",
                        "gate", "", "emp", "", "", "", "", "", ""]],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "updates": { "updatedRows": 1 },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store(&server.uri());
    let added = blocking(move || {
        append_new(store.as_ref(), &[record("a"), record("b"), record("c")])
    })
    .await
    .unwrap();
    assert_eq!(added, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn nothing_new_means_no_append_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{VALUES}/Sheet1!A2:A")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["a"]],
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = store(&server.uri());
    let added = blocking(move || append_new(store.as_ref(), &[record("a")]))
        .await
        .unwrap();
    assert_eq!(added, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn ensure_header_writes_columns_when_row_one_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{VALUES}/Sheet1!A1:M1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "range": "Sheet1!A1:M1" })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{VALUES}/Sheet1!A1:M1")))
        .and(query_param("valueInputOption", "RAW"))
        .and(body_partial_json(json!({ "values": [COLUMNS] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updatedRows": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store(&server.uri());
    assert!(blocking(move || ensure_header(store.as_ref())).await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_and_describe() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{VALUES}/Sheet1!A2:M:clear")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "clearedRange": "Sheet1!A2:M1000",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-1"))
        .and(query_param(
            "fields",
            "spreadsheetId,properties.title,sheets.properties.title",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spreadsheetId": "sheet-1",
            "properties": { "title": "Attendance" },
            "sheets": [{ "properties": { "title": "Sheet1" } }, { "properties": { "title": "Archive" } }],
        })))
        .mount(&server)
        .await;

    let store = store(&server.uri());
    let info = blocking(move || {
        store.clear()?;
        store.describe()
    })
    .await
    .unwrap();
    assert_eq!(info.backend, "sheets");
    assert_eq!(info.title, "Attendance");
    assert_eq!(info.sheets, ["Sheet1", "Archive"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn api_errors_surface_google_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "The caller does not have permission" },
        })))
        .mount(&server)
        .await;

    let store = store(&server.uri());
    let err = blocking(move || store.read_keys()).await.unwrap_err();
    match err {
        StoreError::Http { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "The caller does not have permission");
        }
        other => panic!("expected Http, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_end_to_end_against_mocks() {
    let _ = env_logger::builder().is_test(true).try_init();
    let upstream = MockServer::start().await;
    let sheets = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "uid": "b", "sync_time": "t", "logged_time": "t", "type": "card",
                  "device_id": "d", "person_identifier": "p" },
                { "uid": "d", "sync_time": "t", "logged_time": "t", "type": "card",
                  "device_id": "d", "person_identifier": "p" },
                { "uid": "e", "sync_time": "t", "logged_time": "t", "type": "card",
                  "device_id": "d" },
            ],
            "project": { "code": "HQ", "name": "Headquarters", "organization": "Acme" },
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{VALUES}/Sheet1!A2:A")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["a", "b", "c"]],
        })))
        .mount(&sheets)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{VALUES}/Sheet1!A:M:append")))
        .and(body_partial_json(json!({
            "values": [["d", "t", "t", "card", "d", "", "p", "", "", "", "HQ", "Headquarters", "Acme"]],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "updates": { "updatedRows": 1 },
        })))
        .expect(1)
        .mount(&sheets)
        .await;

    let source_config = SourceConfig {
        base_url: upstream.uri(),
        api_token: "secret".into(),
        ..SourceConfig::default()
    };
    let source = HttpRecordSource::new(&source_config);
    let store = store(&sheets.uri());
    let end = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let query = FetchQuery::new(TimeWindow::trailing_hours(end, 1), &source_config);

    let report = blocking(move || pipeline::run(&source, store.as_ref(), &query))
        .await
        .unwrap();
    assert_eq!(report.fetched, 3);
    assert_eq!(report.dropped, 1);
    assert_eq!(report.added, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_classifies_sheet_failures_as_store_errors() {
    let upstream = MockServer::start().await;
    let sheets = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "uid": "a", "sync_time": "t", "logged_time": "t", "type": "face",
                       "device_id": "d", "person_identifier": "p" }],
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
        .mount(&sheets)
        .await;

    let source_config = SourceConfig {
        base_url: upstream.uri(),
        api_token: "secret".into(),
        ..SourceConfig::default()
    };
    let source = HttpRecordSource::new(&source_config);
    let store = store(&sheets.uri());
    let query = FetchQuery::new(TimeWindow::trailing_hours(Utc::now(), 1), &source_config);

    let err = blocking(move || pipeline::run(&source, store.as_ref(), &query))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::StoreError);
    assert_eq!(err.report.fetched, 1, "fetch count survives the store failure");
    assert_eq!(err.report.added, 0);
}
