//! Assertion helpers for tests.

use axum::http::StatusCode;
use pretty_assertions::assert_eq;

use super::app::TestResponse;

/// Assert response has expected status code
pub fn assert_status(response: &TestResponse, expected: StatusCode) {
    assert_eq!(
        response.status,
        expected,
        "Expected status {}, got {}. Body: {}",
        expected,
        response.status,
        response.text()
    );
}

/// Assert response is OK (200)
pub fn assert_ok(response: &TestResponse) {
    assert_status(response, StatusCode::OK);
}

/// Assert a JSON envelope with `success: true` and return its `data`
pub fn assert_success(response: &TestResponse) -> serde_json::Value {
    let json: serde_json::Value = response.json();
    assert_eq!(
        json["success"],
        true,
        "Expected success envelope, got {}",
        serde_json::to_string_pretty(&json).unwrap()
    );
    json["data"].clone()
}

/// Assert a JSON error body with `success: false`
pub fn assert_failure(response: &TestResponse, expected: StatusCode) -> serde_json::Value {
    assert_status(response, expected);
    let json: serde_json::Value = response.json();
    assert_eq!(json["success"], false);
    json
}

/// Assert an attachment download with the given content type and file name
pub fn assert_attachment(response: &TestResponse, content_type: &str, file_name: &str) {
    assert_ok(response);
    assert_eq!(response.header("content-type"), Some(content_type));
    assert_eq!(
        response.header("content-disposition"),
        Some(format!("attachment; filename=\"{file_name}\"").as_str())
    );
}

/// Assert a file name follows `certificate_<millis>_<serial>.<ext>`
pub fn assert_artifact_name(name: &str, serial: &str, ext: &str) {
    let stem = name
        .strip_prefix("certificate_")
        .and_then(|rest| rest.strip_suffix(&format!("_{serial}.{ext}")))
        .unwrap_or_else(|| panic!("Unexpected artifact name: {name}"));
    assert!(
        !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()),
        "Expected millisecond timestamp in {name}"
    );
}
