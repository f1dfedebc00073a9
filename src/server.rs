//! HTTP server setup and configuration.
//!
//! This module provides the router and application state used by both
//! the production server and integration tests.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header::CACHE_CONTROL, HeaderValue},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::api::{self, ApiResponse, ZipRequest, CONTENT_URL_PREFIX};
use crate::assets::AssetLoader;
use crate::error::ApiError;
use crate::models::{
    AppConfig, BatchResult, CertificateFilter, CertificateRecord, CertificateUpdate,
    StoredCertificate,
};
use crate::services::CertificateService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CertificateService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(service: CertificateService, config: AppConfig) -> Self {
        Self {
            service: Arc::new(service),
            config: Arc::new(config),
        }
    }
}

/// Create application state from an asset loader.
pub fn create_app_state(asset_loader: &AssetLoader) -> anyhow::Result<AppState> {
    let config = AppConfig::load_from_assets(asset_loader);
    let loader = asset_loader
        .clone()
        .with_layout_fallback(config.layout_file.clone());
    let service = CertificateService::from_config(&config, &loader)
        .map_err(|e| anyhow::anyhow!("Failed to create certificate service: {e}"))?;

    Ok(AppState::new(service, config))
}

/// Build the API router with all endpoints and middleware.
///
/// Generated files are served read-only under `/certificates`; they are
/// replaced on regeneration, so clients must not cache them.
pub fn build_router(state: AppState) -> Router {
    let content = Router::new()
        .nest_service(CONTENT_URL_PREFIX, ServeDir::new(&state.config.content_dir))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ));

    Router::new()
        .route(
            "/api/certificates",
            get(handle_list).post(handle_create),
        )
        .route("/api/certificates/activities", get(handle_activities))
        .route("/api/certificates/batch", post(handle_batch))
        .route("/api/certificates/download-zip", post(handle_download_zip))
        .route(
            "/api/certificates/:serial",
            get(handle_get).put(handle_update).delete(handle_delete),
        )
        .route(
            "/api/certificates/:serial/regenerate",
            post(handle_regenerate),
        )
        .route(
            "/api/certificates/:serial/download/:kind",
            get(handle_download),
        )
        // Health check
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .merge(content)
        .layer(TraceLayer::new_for_http())
}

// Wrapper handlers to extract state components for the underlying API handlers

async fn handle_create(
    State(state): State<AppState>,
    body: Result<Json<CertificateRecord>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    api::handle_create(State(state.service), body).await
}

async fn handle_list(
    State(state): State<AppState>,
    filter: Query<CertificateFilter>,
) -> Result<Json<ApiResponse<Vec<StoredCertificate>>>, ApiError> {
    api::handle_list(State(state.service), filter).await
}

async fn handle_activities(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    api::handle_activities(State(state.service)).await
}

async fn handle_update(
    State(state): State<AppState>,
    path: Path<String>,
    body: Result<Json<CertificateUpdate>, JsonRejection>,
) -> Result<Json<ApiResponse<api::CertificateResponse>>, ApiError> {
    api::handle_update(State(state.service), path, body).await
}

async fn handle_get(
    State(state): State<AppState>,
    path: Path<String>,
) -> Result<Json<ApiResponse<StoredCertificate>>, ApiError> {
    api::handle_get(State(state.service), path).await
}

async fn handle_delete(
    State(state): State<AppState>,
    path: Path<String>,
) -> Result<Json<ApiResponse<api::DeleteResponse>>, ApiError> {
    api::handle_delete(State(state.service), path).await
}

async fn handle_regenerate(
    State(state): State<AppState>,
    path: Path<String>,
) -> Result<Json<ApiResponse<api::CertificateResponse>>, ApiError> {
    api::handle_regenerate(State(state.service), path).await
}

async fn handle_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ApiResponse<BatchResult>>, ApiError> {
    api::handle_batch(State(state.service), body).await
}

async fn handle_download(
    State(state): State<AppState>,
    path: Path<(String, String)>,
) -> Result<Response, ApiError> {
    api::handle_download(State(state.service), path).await
}

async fn handle_download_zip(
    State(state): State<AppState>,
    body: Result<Json<ZipRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    api::handle_download_zip(State(state.service), body).await
}
