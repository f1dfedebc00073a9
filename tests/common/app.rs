//! Test application factory for integration tests.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use certforge::assets::AssetLoader;
use certforge::models::{AppConfig, LayoutSpec};
use certforge::rendering::{EngineLauncher, FieldRenderer, SvgEngineLauncher};
use certforge::server::{build_router, AppState};
use certforge::services::{CertificateService, InMemoryCertificateStore};

use super::fixtures::{self, ProbeLauncher, SMALL_LAYOUT};

/// Test application with router and direct access to the service
pub struct TestApp {
    router: axum::Router,
    pub state: AppState,
    /// Holds the content directory and template for the app's lifetime
    pub dir: TempDir,
}

impl TestApp {
    /// App backed by an instrumented engine that paints nothing
    pub fn new() -> Self {
        Self::with_launcher(Arc::new(ProbeLauncher::new()))
    }

    /// App backed by the real resvg engine (system fonts only)
    pub fn with_svg_engine() -> Self {
        Self::with_launcher(Arc::new(SvgEngineLauncher::new(None)))
    }

    pub fn with_launcher(launcher: Arc<dyn EngineLauncher>) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        Self::in_dir(dir, launcher)
    }

    /// App rooted in an existing directory, for launchers that need to know
    /// the template location up front
    pub fn in_dir(dir: TempDir, launcher: Arc<dyn EngineLauncher>) -> Self {
        let config = Self::config_for(dir.path());
        fixtures::write_template(&config.template_path);

        let service = CertificateService::new(
            &config,
            LayoutSpec::from_yaml(SMALL_LAYOUT).expect("Invalid test layout"),
            FieldRenderer::from_assets(&AssetLoader::default()).expect("Invalid overlay template"),
            launcher,
            Arc::new(InMemoryCertificateStore::new()),
        );
        let state = AppState::new(service, config);
        let router = build_router(state.clone());

        Self { router, state, dir }
    }

    /// Configuration rooted in `dir`; the template lives at `dir/template.png`
    pub fn config_for(dir: &Path) -> AppConfig {
        AppConfig {
            content_dir: dir.join("generated"),
            template_path: dir.join("template.png"),
            ..AppConfig::default()
        }
    }

    pub fn service(&self) -> &CertificateService {
        &self.state.service
    }

    pub fn template_path(&self) -> PathBuf {
        self.state.config.template_path.clone()
    }

    pub fn content_dir(&self) -> PathBuf {
        self.state.config.content_dir.clone()
    }

    /// File names currently in the content directory, sorted
    pub fn content_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.content_dir())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Make a GET request to the given path
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    /// Make a DELETE request to the given path
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(Request::delete(path).body(Body::empty()).unwrap())
            .await
    }

    /// Make a POST request with JSON body
    pub async fn post_json(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::post(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.request(request).await
    }

    /// Make a PUT request with JSON body
    pub async fn put_json(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::put(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.request(request).await
    }

    /// Create a certificate through the API and return the response
    pub async fn create(&self, serial: &str) -> TestResponse {
        self.post_json("/api/certificates", &fixtures::record_json(serial))
            .await
    }

    /// Send a request to the router
    async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Test response with convenience methods
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    /// Parse body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse JSON response")
    }

    /// Get body as string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_jpeg(&self) -> bool {
        self.body.starts_with(&[0xFF, 0xD8])
    }

    pub fn is_pdf(&self) -> bool {
        self.body.starts_with(b"%PDF-")
    }

    pub fn is_zip(&self) -> bool {
        self.body.starts_with(b"PK\x03\x04")
    }
}
