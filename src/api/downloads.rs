use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::ArtifactKind;
use crate::services::CertificateService;

fn attachment(content_type: &str, file_name: &str, bytes: Vec<u8>) -> Result<Response, ApiError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name.replace('"', "")),
        )
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))
        .map_err(|e| ApiError::Internal(format!("Failed to build response: {e}")))
}

/// Download the current raster or PDF of a certificate
pub async fn handle_download(
    State(service): State<Arc<CertificateService>>,
    Path((serial, kind)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let kind: ArtifactKind = kind.parse().map_err(ApiError::BadRequest)?;

    let download = service.download_artifact(&serial, kind).await?;
    tracing::info!(
        serial = %serial,
        kind = %kind,
        bytes = download.bytes.len(),
        "Artifact downloaded"
    );

    attachment(download.content_type, &download.file_name, download.bytes)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipRequest {
    pub serial_numbers: Vec<String>,
    #[serde(default)]
    pub kind: Option<ArtifactKind>,
}

/// Bundle the current artifacts of several certificates into one zip
pub async fn handle_download_zip(
    State(service): State<Arc<CertificateService>>,
    body: Result<Json<ZipRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if request.serial_numbers.is_empty() {
        return Err(ApiError::BadRequest(
            "serialNumbers must contain at least one serial number".to_string(),
        ));
    }
    let kind = request.kind.unwrap_or(ArtifactKind::Raster);

    let bytes = service
        .download_batch_zip(&request.serial_numbers, kind)
        .await?;

    attachment("application/zip", &format!("certificates_{kind}.zip"), bytes)
}
