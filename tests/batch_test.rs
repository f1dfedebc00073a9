//! Batch generation: partial failures are reported, not fatal.

mod common;

use axum::http::StatusCode;
use certforge::models::ArtifactKind;
use common::fixtures::{self, serials, ProbeLauncher};
use common::TestApp;
use pretty_assertions::assert_eq;
use std::sync::Arc;

const ALL: [&str; 3] = [serials::PRIMARY, serials::SECOND, serials::THIRD];

async fn seed(app: &TestApp) {
    for serial in ALL {
        app.service()
            .generate_certificate(fixtures::record(serial), false)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_template_lost_mid_batch_fails_only_remaining_records() {
    let dir = tempfile::tempdir().unwrap();
    let template = TestApp::config_for(dir.path()).template_path;
    // Seeding rasterizes twice per record (raster + pdf); the batch then
    // rasterizes once per record. The template disappears after the second
    // batch raster.
    let launcher = ProbeLauncher::new().removing_template_after(ALL.len() * 2 + 2, template);
    let app = TestApp::in_dir(dir, Arc::new(launcher));
    seed(&app).await;

    let serial_list: Vec<String> = ALL.iter().map(|s| s.to_string()).collect();
    let result = app
        .service()
        .generate_batch(Some(&serial_list), ArtifactKind::Raster)
        .await
        .unwrap();

    let succeeded: Vec<&str> = result
        .succeeded
        .iter()
        .map(|a| a.serial_number.as_str())
        .collect();
    assert_eq!(succeeded, vec![serials::PRIMARY, serials::SECOND]);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].serial_number, serials::THIRD);
    assert_eq!(result.failed[0].reason, "TemplateNotFound");
}

#[tokio::test]
async fn test_batch_endpoint_renders_every_stored_record() {
    let app = TestApp::new();
    seed(&app).await;

    let response = app.post_json("/api/certificates/batch", "{}").await;

    common::assert_ok(&response);
    let data = common::assert_success(&response);
    assert_eq!(data["succeeded"].as_array().unwrap().len(), 3);
    assert!(data["failed"].as_array().unwrap().is_empty());
    // Each record now has two rasters and one PDF
    assert_eq!(app.content_files().len(), 9);
}

#[tokio::test]
async fn test_batch_endpoint_reports_unknown_serials() {
    let app = TestApp::new();
    seed(&app).await;

    let response = app
        .post_json(
            "/api/certificates/batch",
            r#"{"serialNumbers": ["C-1001", "C-404"], "kind": "pdf"}"#,
        )
        .await;

    let data = common::assert_success(&response);
    assert_eq!(data["succeeded"][0]["serialNumber"], serials::PRIMARY);
    assert_eq!(data["succeeded"][0]["kind"], "pdf");
    assert_eq!(data["failed"][0]["serialNumber"], "C-404");
    assert_eq!(data["failed"][0]["reason"], "NotFound");
}

#[tokio::test]
async fn test_batch_missing_template_fails_every_record() {
    let app = TestApp::new();
    seed(&app).await;
    std::fs::remove_file(app.template_path()).unwrap();

    let response = app.post_json("/api/certificates/batch", "{}").await;

    assert_eq!(response.status, StatusCode::OK);
    let data = common::assert_success(&response);
    let failed = data["failed"].as_array().unwrap();
    assert_eq!(failed.len(), 3);
    assert!(failed.iter().all(|f| f["reason"] == "TemplateNotFound"));
}

#[tokio::test]
async fn test_batch_malformed_body_is_bad_request() {
    let app = TestApp::new();
    seed(&app).await;
    let before = app.content_files();

    let response = app
        .post_json(
            "/api/certificates/batch",
            r#"{"serialNumbers": "C-1001", "kind": "pdf"}"#,
        )
        .await;

    common::assert_failure(&response, StatusCode::BAD_REQUEST);
    assert_eq!(app.content_files(), before);
}

#[tokio::test]
async fn test_batch_empty_body_renders_every_stored_record() {
    let app = TestApp::new();
    seed(&app).await;

    let response = app.post_json("/api/certificates/batch", "").await;

    let data = common::assert_success(&response);
    assert_eq!(data["succeeded"].as_array().unwrap().len(), 3);
    assert!(data["succeeded"]
        .as_array()
        .unwrap()
        .iter()
        .all(|a| a["kind"] == "jpg"));
}
