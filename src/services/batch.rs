//! Batch rendering and zip packaging.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{ArtifactStore, RenderPipeline};
use crate::error::{CertificateError, StorageError};
use crate::models::{ArtifactKind, BatchFailure, BatchResult, CertificateRecord, RenderArtifact};
use crate::rendering::SignatureSource;

pub struct BatchOrchestrator {
    pipeline: Arc<RenderPipeline>,
    artifacts: Arc<ArtifactStore>,
}

impl BatchOrchestrator {
    pub fn new(pipeline: Arc<RenderPipeline>, artifacts: Arc<ArtifactStore>) -> Self {
        Self {
            pipeline,
            artifacts,
        }
    }

    /// Render and store `kind` for every record, one at a time. A failing
    /// record is reported and the batch moves on.
    pub async fn generate_all(
        &self,
        records: &[CertificateRecord],
        kind: ArtifactKind,
    ) -> BatchResult {
        let mut result = BatchResult::default();

        for record in records {
            match self.generate_one(record, kind).await {
                Ok(artifact) => result.succeeded.push(artifact),
                Err(e) => {
                    tracing::warn!(
                        serial = %record.serial_number,
                        reason = %e.reason(),
                        error = %e,
                        "Batch record failed"
                    );
                    result.failed.push(BatchFailure {
                        serial_number: record.serial_number.clone(),
                        reason: e.reason(),
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            kind = %kind,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "Batch finished"
        );
        result
    }

    async fn generate_one(
        &self,
        record: &CertificateRecord,
        kind: ArtifactKind,
    ) -> Result<RenderArtifact, CertificateError> {
        record.validate()?;
        let signature = SignatureSource::for_record(record, false);
        let bytes = self.pipeline.render(record, kind, &signature).await?;
        Ok(self
            .artifacts
            .save(&bytes, &record.serial_number, kind)
            .await?)
    }

    /// Fold artifacts of `kind` into a zip with entries `<serial>.<ext>`.
    /// Files that vanished are skipped. After a PDF bundle, lingering
    /// temporary PDFs are swept.
    pub async fn package_as_zip(
        &self,
        artifacts: &[RenderArtifact],
        kind: ArtifactKind,
    ) -> Result<Vec<u8>, StorageError> {
        let mut entries = Vec::new();
        let mut names = HashSet::new();

        for artifact in artifacts.iter().filter(|a| a.kind == kind) {
            let name = artifact.bundle_name();
            if names.contains(&name) {
                continue;
            }
            match tokio::fs::read(&artifact.path).await {
                Ok(bytes) => {
                    names.insert(name.clone());
                    entries.push((name, bytes));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %artifact.path.display(), "Skipping missing artifact");
                }
                Err(e) => return Err(StorageError::io(&artifact.path, e)),
            }
        }

        let entry_count = entries.len();
        let bytes = tokio::task::spawn_blocking(move || write_zip(entries))
            .await
            .map_err(|e| StorageError::Zip(format!("zip task failed: {e}")))??;

        tracing::info!(kind = %kind, entries = entry_count, bytes = bytes.len(), "Zip bundle built");

        if kind == ArtifactKind::Pdf {
            if let Err(e) = self.artifacts.sweep_temporary(ArtifactKind::Pdf).await {
                tracing::warn!(error = %e, "Temporary PDF sweep failed");
            }
        }

        Ok(bytes)
    }
}

fn write_zip(entries: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>, StorageError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, bytes) in entries {
        zip.start_file(name, options)
            .map_err(|e| StorageError::Zip(e.to_string()))?;
        zip.write_all(&bytes)
            .map_err(|e| StorageError::Zip(e.to_string()))?;
    }

    let cursor = zip.finish().map_err(|e| StorageError::Zip(e.to_string()))?;
    Ok(cursor.into_inner())
}
