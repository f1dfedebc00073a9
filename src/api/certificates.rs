use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ApiResponse;
use crate::error::ApiError;
use crate::models::{
    ArtifactKind, BatchResult, CertificateFilter, CertificateRecord, CertificateUpdate,
    RenderArtifact, StoredCertificate,
};
use crate::services::{CertificateService, GeneratedCertificate};

/// Public URL prefix of the content directory
pub const CONTENT_URL_PREFIX: &str = "/certificates";

/// A generated certificate with links to its files
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateResponse {
    #[serde(flatten)]
    pub generated: GeneratedCertificate,
    pub image_url: String,
    pub pdf_url: String,
}

impl From<GeneratedCertificate> for CertificateResponse {
    fn from(generated: GeneratedCertificate) -> Self {
        Self {
            image_url: content_url(&generated.raster),
            pdf_url: content_url(&generated.pdf),
            generated,
        }
    }
}

fn content_url(artifact: &RenderArtifact) -> String {
    format!("{CONTENT_URL_PREFIX}/{}", artifact.file_name())
}

/// Create a certificate and render it. A `signatureImagePath` in the body
/// refers to a file uploaded for this request.
pub async fn handle_create(
    State(service): State<Arc<CertificateService>>,
    body: Result<Json<CertificateRecord>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(record) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    tracing::info!(serial = %record.serial_number, "Create certificate request");
    let generated = service.create_certificate(record).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "Certificate created successfully",
            CertificateResponse::from(generated),
        )),
    ))
}

/// List certificates, optionally filtered by `activity`, `participantName`
/// and `examinerName` substrings
pub async fn handle_list(
    State(service): State<Arc<CertificateService>>,
    Query(filter): Query<CertificateFilter>,
) -> Result<Json<ApiResponse<Vec<StoredCertificate>>>, ApiError> {
    let certificates = service.search(&filter).await?;
    Ok(Json(ApiResponse::data(certificates)))
}

pub async fn handle_activities(
    State(service): State<Arc<CertificateService>>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    let activities = service.activities().await?;
    Ok(Json(ApiResponse::data(activities)))
}

/// Change fields of a stored certificate and render it again
pub async fn handle_update(
    State(service): State<Arc<CertificateService>>,
    Path(serial): Path<String>,
    body: Result<Json<CertificateUpdate>, JsonRejection>,
) -> Result<Json<ApiResponse<CertificateResponse>>, ApiError> {
    let Json(update) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    tracing::info!(serial = %serial, "Update certificate request");
    let generated = service.update_certificate(&serial, update).await?;
    Ok(Json(ApiResponse::ok(
        "Certificate updated successfully",
        generated.into(),
    )))
}

pub async fn handle_get(
    State(service): State<Arc<CertificateService>>,
    Path(serial): Path<String>,
) -> Result<Json<ApiResponse<StoredCertificate>>, ApiError> {
    let certificate = service.get(&serial).await?;
    Ok(Json(ApiResponse::data(certificate)))
}

pub async fn handle_regenerate(
    State(service): State<Arc<CertificateService>>,
    Path(serial): Path<String>,
) -> Result<Json<ApiResponse<CertificateResponse>>, ApiError> {
    tracing::info!(serial = %serial, "Regenerate request");
    let generated = service.regenerate(&serial).await?;
    Ok(Json(ApiResponse::ok(
        "Certificate regenerated successfully",
        generated.into(),
    )))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub removed_files: usize,
}

pub async fn handle_delete(
    State(service): State<Arc<CertificateService>>,
    Path(serial): Path<String>,
) -> Result<Json<ApiResponse<DeleteResponse>>, ApiError> {
    let removed_files = service.delete_certificate(&serial).await?;
    Ok(Json(ApiResponse::ok(
        "Certificate deleted successfully",
        DeleteResponse { removed_files },
    )))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    /// Stored serial numbers to render; all stored records when absent
    #[serde(default)]
    pub serial_numbers: Option<Vec<String>>,
    #[serde(default)]
    pub kind: Option<ArtifactKind>,
}

impl BatchRequest {
    /// An empty body asks for every stored record as JPEG
    pub fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid batch request: {e}")))
    }
}

/// Render many stored certificates; per-record failures are reported in the body
pub async fn handle_batch(
    State(service): State<Arc<CertificateService>>,
    body: Bytes,
) -> Result<Json<ApiResponse<BatchResult>>, ApiError> {
    let request = BatchRequest::from_body(&body)?;
    let kind = request.kind.unwrap_or(ArtifactKind::Raster);

    let result = service
        .generate_batch(request.serial_numbers.as_deref(), kind)
        .await?;

    let message = format!(
        "{} generated, {} failed",
        result.succeeded.len(),
        result.failed.len()
    );
    Ok(Json(ApiResponse::ok(&message, result)))
}
