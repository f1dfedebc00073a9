use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::Target;

/// Output format of a stored artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    #[serde(rename = "jpg", alias = "raster", alias = "jpeg")]
    Raster,
    #[serde(rename = "pdf")]
    Pdf,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Raster => "jpg",
            ArtifactKind::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Raster => "image/jpeg",
            ArtifactKind::Pdf => "application/pdf",
        }
    }

    /// Layout target this kind is rendered with
    pub fn target(&self) -> Target {
        match self {
            ArtifactKind::Raster => Target::Preview,
            ArtifactKind::Pdf => Target::Pdf,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "jpg" => Some(ArtifactKind::Raster),
            "pdf" => Some(ArtifactKind::Pdf),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "raster" | "image" => Ok(ArtifactKind::Raster),
            "pdf" => Ok(ArtifactKind::Pdf),
            other => Err(format!("unknown artifact kind '{other}' (expected jpg or pdf)")),
        }
    }
}

/// A file written by the artifact store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub serial_number: String,
    pub created_at: DateTime<Utc>,
}

impl RenderArtifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Name used inside zip bundles: `<serialNumber>.<ext>`
    pub fn bundle_name(&self) -> String {
        format!("{}.{}", self.serial_number, self.kind.extension())
    }
}

/// One record that could not be rendered during a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub serial_number: String,
    /// Cause tag, e.g. `TemplateNotFound`
    pub reason: String,
    pub message: String,
}

/// Per-record outcomes of a batch run; never persisted. One succeeded entry
/// per rendered record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub succeeded: Vec<RenderArtifact>,
    pub failed: Vec<BatchFailure>,
}
