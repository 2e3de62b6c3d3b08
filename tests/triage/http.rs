use crate::common::*;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use triagebox::rules::RuleSet;
use triagebox::server::{router, AppState};
use triagebox::triage::TriageConfig;

const BOUNDARY: &str = "triagebox-test-boundary";

fn app(config: TriageConfig) -> axum::Router {
    let rules = Arc::new(RuleSet::compile(RULES).unwrap());
    router(AppState::new(Arc::new(config), rules))
}

/// One multipart part: field name, optional filename, body.
fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn upload_returns_report_array() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = zip_bytes(&[("photo.png", PNG_1X1), ("notes.bin", GARBAGE)]);
    let config = test_config(tmp.path());
    let upload_dir = config.storage.upload_dir.clone();
    let extract_dir = config.storage.extract_dir.clone();

    let body = multipart_body(&[("file", Some("case 42.zip"), archive.as_slice())]);
    let (status, v) = send(app(config), upload_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    let files = v.as_array().expect("array body");
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["file_name"], "photo.png");
    assert_eq!(files[0]["file_mime_type"], "image/png");
    assert_eq!(files[1]["file_mime_type"], Value::Null);
    assert_eq!(files[1]["embedded_files"], json!([]));

    assert_eq!(count_entries(&upload_dir), 0, "upload left behind");
    assert_eq!(count_entries(&extract_dir), 0, "scratch directory left behind");
}

#[tokio::test]
async fn missing_file_part_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let body = multipart_body(&[("comment", None, b"no archive here")]);
    let (status, v) = send(app(test_config(tmp.path())), upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v, json!({ "error": "No file part" }));
}

#[tokio::test]
async fn empty_filename_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let body = multipart_body(&[("file", Some(""), b"")]);
    let (status, v) = send(app(test_config(tmp.path())), upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v, json!({ "error": "No selected file" }));
}

#[tokio::test]
async fn traversal_archive_is_a_client_error() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = zip_bytes(&[("../../escape.txt", b"x")]);
    let config = test_config(tmp.path());
    let upload_dir = config.storage.upload_dir.clone();

    let body = multipart_body(&[("file", Some("evil.zip"), archive.as_slice())]);
    let (status, v) = send(app(config), upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let msg = v["error"].as_str().expect("error message");
    assert!(msg.contains("../../escape.txt"), "{msg}");
    assert!(!tmp.path().join("escape.txt").exists());
    assert_eq!(count_entries(&upload_dir), 0);
}

#[tokio::test]
async fn unreadable_archive_is_a_client_error() {
    let tmp = tempfile::tempdir().unwrap();
    let body = multipart_body(&[("file", Some("x.zip"), b"garbage, not a zip")]);
    let (status, v) = send(app(test_config(tmp.path())), upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(v["error"].as_str().unwrap().starts_with("Cannot open archive"));
}

#[tokio::test]
async fn oversized_archive_is_payload_too_large() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = zip_bytes(&[("a", b"1"), ("b", b"2")]);
    let mut config = test_config(tmp.path());
    config.extraction.max_entries = 1;

    let body = multipart_body(&[("file", Some("many.zip"), archive.as_slice())]);
    let (status, v) = send(app(config), upload_request(body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(v["error"].is_string());
}

#[tokio::test]
async fn non_multipart_request_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, v) = send(app(test_config(tmp.path())), req).await;

    assert!(status.is_client_error());
    assert!(v["error"].is_string());
}

#[tokio::test]
async fn corrupt_member_is_a_client_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let upload_dir = config.storage.upload_dir.clone();
    let extract_dir = config.storage.extract_dir.clone();

    let archive = corrupt_member_zip();
    let body = multipart_body(&[("file", Some("crc.zip"), archive.as_slice())]);
    let (status, v) = send(app(config), upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let msg = v["error"].as_str().expect("error message");
    assert!(msg.starts_with("Cannot extract archive entry ledger.csv"), "{msg}");
    assert!(!msg.contains(&*tmp.path().to_string_lossy()), "{msg}");
    assert_eq!(count_entries(&upload_dir), 0);
    assert_eq!(count_entries(&extract_dir), 0);
}

#[tokio::test]
async fn colliding_paths_are_a_client_error() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = zip_bytes(&[("a", b"file"), ("a/b", b"nested")]);
    let body = multipart_body(&[("file", Some("clash.zip"), archive.as_slice())]);
    let (status, v) = send(app(test_config(tmp.path())), upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let msg = v["error"].as_str().expect("error message");
    assert!(msg.starts_with("Cannot extract archive entry a/b"), "{msg}");
    assert!(!msg.contains(&*tmp.path().to_string_lossy()), "{msg}");
}
