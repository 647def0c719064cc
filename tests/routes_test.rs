mod helpers;

use geostamp_ocr::app_state::AppState;
use geostamp_ocr::routes;
use geostamp_ocr::services::ocr::EngineFactory;
use helpers::{test_config, Script, ScriptedFactory, UnavailableFactory};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;

const STAMP: &str = "GPS Map Camera\n9AB8+2X Lahore, Punjab\nLat 31.5204,74.3587\n14:30 08/11/2023";

/// Serve the API on an ephemeral local port and return its base URL.
async fn spawn_app(factory: Arc<dyn EngineFactory>) -> String {
    let state = AppState::new(&test_config(), factory);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, routes::api_router(state)).await.expect("serve");
    });
    format!("http://{addr}")
}

fn upload(images: &[(&str, &[u8])]) -> Form {
    images.iter().fold(Form::new(), |form, (name, bytes)| {
        form.part("images", Part::bytes(bytes.to_vec()).file_name(name.to_string()))
    })
}

#[tokio::test]
async fn test_batch_returns_outcomes_in_order() {
    let script = Arc::new(Script::default());
    script.fail_once("broken");
    let base = spawn_app(Arc::new(ScriptedFactory { script })).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/v1/batch"))
        .multipart(upload(&[("good.jpg", STAMP.as_bytes()), ("bad.jpg", b"broken".as_slice())]))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["total"], 2);
    assert_eq!(body["succeeded"], 1);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["entries"][0]["outcome"], "extracted");
    assert_eq!(body["entries"][0]["image_name"], "good.jpg");
    assert_eq!(body["entries"][0]["timestamp"], "14:30 08/11/2023");
    assert_eq!(body["entries"][1]["outcome"], "failed");
    assert_eq!(body["entries"][1]["image_name"], "bad.jpg");
}

#[tokio::test]
async fn test_export_serves_csv_attachment() {
    let script = Arc::new(Script::default());
    let base = spawn_app(Arc::new(ScriptedFactory { script })).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/v1/batch/export"))
        .multipart(upload(&[("good.jpg", STAMP.as_bytes())]))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers["content-type"], "text/csv; charset=utf-8");
    let disposition = headers["content-disposition"].to_str().expect("header");
    assert!(disposition.starts_with("attachment; filename=\"plus_codes_"));
    assert!(disposition.ends_with(".csv\""));

    let body = response.bytes().await.expect("body");
    let csv = std::str::from_utf8(&body).expect("utf-8");
    let csv = csv.strip_prefix('\u{feff}').expect("bom");
    let rows: Vec<_> = csv.lines().collect();
    assert_eq!(rows[0], "Location/Plus Code,Latitude,Longitude,Timestamp,PICS");
    assert!(rows[1].ends_with(",31.5204,74.3587,14:30 08/11/2023,good.jpg"));
}

#[tokio::test]
async fn test_export_with_no_records_lists_failures() {
    let script = Arc::new(Script::default());
    script.fail_once("a");
    script.fail_once("b");
    let base = spawn_app(Arc::new(ScriptedFactory { script })).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/v1/batch/export"))
        .multipart(upload(&[("a.jpg", b"a".as_slice()), ("b.jpg", b"b".as_slice())]))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.expect("json");
    assert!(body["error"].as_str().expect("error").contains("nothing to export"));

    let failures = body["failures"].as_array().expect("failures");
    let names: Vec<_> = failures.iter().map(|f| f["image_name"].as_str().expect("name")).collect();
    assert_eq!(names, ["a.jpg", "b.jpg"]);
    assert!(failures
        .iter()
        .all(|f| f["error"].as_str().expect("error").contains("resource exhausted")));
}

#[tokio::test]
async fn test_upload_without_images_rejected() {
    let base = spawn_app(Arc::new(ScriptedFactory {
        script: Arc::new(Script::default()),
    }))
    .await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/v1/batch"))
        .multipart(Form::new().text("note", "no files here"))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pool_failure_is_service_unavailable() {
    let base = spawn_app(Arc::new(UnavailableFactory)).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(health["checks"]["engine_pool"]["status"], "idle");

    let response = client
        .post(format!("{base}/api/v1/batch/export"))
        .multipart(upload(&[("good.jpg", STAMP.as_bytes())]))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await.expect("json");
    assert!(body["error"]
        .as_str()
        .expect("error")
        .contains("model weights not found"));

    let response = client.get(format!("{base}/health")).send().await.expect("request");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let health: Value = response.json().await.expect("json");
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["checks"]["engine_pool"]["status"], "error");
}
