use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::models::{ArtifactKind, Field, Target};

/// Startup-time configuration problems (layout, template asset, config files)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Layout parse error: {0}")]
    LayoutParse(String),

    #[error("Layout has no entry for target '{0}'")]
    MissingTarget(Target),

    #[error("Layout for target '{target}' is missing field '{field}'")]
    MissingField { target: Target, field: Field },

    #[error("Layout for target '{target}' has invalid canvas {width}x{height}")]
    InvalidCanvas {
        target: Target,
        width: u32,
        height: u32,
    },

    #[error("Overlay template error: {0}")]
    OverlayTemplate(String),

    #[error("Certificate template not found: {0}")]
    TemplateMissing(String),
}

/// A single rejected record field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Malformed record; raised before any rendering resource is touched
#[derive(Debug, Clone, Error)]
#[error("Validation failed: {}", summarize(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Certificate template not found: {0}")]
    TemplateNotFound(String),

    #[error("Signature image unreadable: {path}: {reason}")]
    SignatureUnreadable { path: String, reason: String },

    #[error("Render engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Overlay error: {0}")]
    Overlay(String),

    #[error("SVG parse error: {0}")]
    SvgParse(String),

    #[error("Failed to allocate pixmap")]
    PixmapAllocation,

    #[error("JPEG encode error: {0}")]
    JpegEncode(String),

    #[error("PDF encode error: {0}")]
    PdfEncode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Short machine-readable cause, used in batch reports and API bodies
    pub fn reason(&self) -> &'static str {
        match self {
            RenderError::TemplateNotFound(_) => "TemplateNotFound",
            RenderError::SignatureUnreadable { .. } => "SignatureUnreadable",
            RenderError::EngineUnavailable(_) => "RenderEngineUnavailable",
            _ => "RenderFailed",
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No {kind} artifact found for {serial}")]
    NotFound { serial: String, kind: ArtifactKind },

    #[error("Zip error: {0}")]
    Zip(String),
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Errors from the certificate metadata store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Certificate {0} not found")]
    NotFound(String),

    #[error("Certificate with ID {0} already exists")]
    Conflict(String),
}

/// Outcome of a failed certificate operation, as seen by callers of the service
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CertificateError {
    pub fn reason(&self) -> String {
        match self {
            CertificateError::Validation(_) => "ValidationError".to_string(),
            CertificateError::Render(e) => e.reason().to_string(),
            CertificateError::Storage(_) => "StorageError".to_string(),
            CertificateError::Store(_) => "StoreError".to_string(),
            CertificateError::Config(_) => "ConfigurationError".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(ValidationError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rendering error: {0}")]
    Render(#[from] RenderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CertificateError> for ApiError {
    fn from(e: CertificateError) -> Self {
        match e {
            CertificateError::Validation(v) => ApiError::Validation(v),
            CertificateError::Render(r) => ApiError::Render(r),
            CertificateError::Storage(StorageError::NotFound { serial, kind }) => {
                ApiError::NotFound(format!("No {kind} artifact for {serial}"))
            }
            CertificateError::Storage(s) => ApiError::Storage(s),
            CertificateError::Store(StoreError::NotFound(serial)) => {
                ApiError::NotFound(format!("Certificate {serial} not found"))
            }
            CertificateError::Store(StoreError::Conflict(serial)) => {
                ApiError::Conflict(format!("Certificate with ID {serial} already exists"))
            }
            CertificateError::Config(c) => ApiError::Internal(c.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Render(_) | ApiError::Storage(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = match &self {
            ApiError::Validation(v) => json!({
                "success": false,
                "message": "Validation error",
                "errors": v.errors,
            }),
            ApiError::Render(e) => json!({
                "success": false,
                "message": "Failed to generate certificate",
                "reason": e.reason(),
                "error": e.to_string(),
            }),
            _ => json!({
                "success": false,
                "message": self.to_string(),
            }),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }

        (status, Json(body)).into_response()
    }
}
