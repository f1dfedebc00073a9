//! Certificate operations as seen by the outer surfaces (HTTP, CLI).

use std::collections::BTreeSet;
use std::sync::Arc;

use super::{
    ArtifactStore, BatchOrchestrator, CertificateStore, InMemoryCertificateStore, RenderPipeline,
    TempArtifact,
};
use crate::assets::AssetLoader;
use crate::error::{CertificateError, ConfigError, StorageError, StoreError};
use crate::models::{
    AppConfig, ArtifactKind, BatchFailure, BatchResult, CertificateFilter, CertificateRecord,
    CertificateUpdate, LayoutSpec, RenderArtifact, StoredCertificate,
};
use crate::rendering::{
    ComposeSettings, Compositor, EngineLauncher, FieldRenderer, SignatureSource, SvgEngineLauncher,
};

/// Result of a successful generation: the stored record and both artifacts
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCertificate {
    pub certificate: StoredCertificate,
    pub raster: RenderArtifact,
    pub pdf: RenderArtifact,
}

/// Bytes ready to hand to a client
#[derive(Debug)]
pub struct Download {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub struct CertificateService {
    store: Arc<dyn CertificateStore>,
    pipeline: Arc<RenderPipeline>,
    artifacts: Arc<ArtifactStore>,
    batch: BatchOrchestrator,
}

impl CertificateService {
    pub fn new(
        config: &AppConfig,
        layout: LayoutSpec,
        renderer: FieldRenderer,
        launcher: Arc<dyn EngineLauncher>,
        store: Arc<dyn CertificateStore>,
    ) -> Self {
        let compositor = Compositor::new(launcher, ComposeSettings::from_config(config));
        let pipeline = Arc::new(RenderPipeline::new(
            renderer,
            compositor,
            Arc::new(layout),
            config.template_path.clone(),
        ));
        let artifacts = Arc::new(ArtifactStore::new(config.content_dir.clone()));
        let batch = BatchOrchestrator::new(pipeline.clone(), artifacts.clone());

        Self {
            store,
            pipeline,
            artifacts,
            batch,
        }
    }

    /// Production wiring: layout and overlay template from assets, resvg
    /// engine, in-memory metadata store
    pub fn from_config(config: &AppConfig, loader: &AssetLoader) -> Result<Self, ConfigError> {
        let layout = LayoutSpec::load_from_assets(loader)?;
        let renderer = FieldRenderer::from_assets(loader)?;
        let launcher = Arc::new(SvgEngineLauncher::new(config.fonts_dir.clone()));
        Ok(Self::new(
            config,
            layout,
            renderer,
            launcher,
            Arc::new(InMemoryCertificateStore::new()),
        ))
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    /// Startup check for the template; requests fail until it appears
    pub async fn check_template(&self) -> Result<(), ConfigError> {
        let path = self.pipeline.template_path();
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }
        tracing::warn!(
            path = %path.display(),
            "Certificate template not found, generation will fail until it is provided"
        );
        Err(ConfigError::TemplateMissing(path.display().to_string()))
    }

    /// Create a new certificate: rejects an existing serial number, then
    /// renders with the record's signature treated as a fresh upload
    pub async fn create_certificate(
        &self,
        record: CertificateRecord,
    ) -> Result<GeneratedCertificate, CertificateError> {
        record.validate()?;
        if self.store.get(&record.serial_number).await?.is_some() {
            return Err(StoreError::Conflict(record.serial_number).into());
        }
        self.generate_certificate(record, true).await
    }

    /// Validate, render both targets, store both artifacts, record metadata.
    /// `fresh_signature` makes an unreadable signature an error instead of
    /// rendering without one.
    pub async fn generate_certificate(
        &self,
        record: CertificateRecord,
        fresh_signature: bool,
    ) -> Result<GeneratedCertificate, CertificateError> {
        record.validate()?;
        let serial = record.serial_number.clone();
        let signature = SignatureSource::for_record(&record, fresh_signature);

        let rendered = self.pipeline.render_both(&record, &signature).await?;
        let raster = self
            .artifacts
            .save(&rendered.raster, &serial, ArtifactKind::Raster)
            .await?;
        let pdf = match self
            .artifacts
            .save(&rendered.pdf, &serial, ArtifactKind::Pdf)
            .await
        {
            Ok(pdf) => pdf,
            Err(e) => {
                // The raster alone must not become current
                if let Err(discard) = self.artifacts.discard(&raster).await {
                    tracing::warn!(
                        serial = %serial,
                        error = %discard,
                        "Failed to roll back raster after PDF save failed"
                    );
                }
                return Err(e.into());
            }
        };
        let certificate = self.store.upsert(record).await?;

        tracing::info!(
            serial = %serial,
            raster = %raster.file_name(),
            pdf = %pdf.file_name(),
            "Certificate generated"
        );

        Ok(GeneratedCertificate {
            certificate,
            raster,
            pdf,
        })
    }

    /// Re-render a stored record; a stored signature that is gone is skipped
    pub async fn regenerate(&self, serial: &str) -> Result<GeneratedCertificate, CertificateError> {
        let stored = self.get(serial).await?;
        self.generate_certificate(stored.record, false).await
    }

    pub async fn get(&self, serial: &str) -> Result<StoredCertificate, CertificateError> {
        self.store
            .get(serial)
            .await?
            .ok_or_else(|| StoreError::NotFound(serial.to_string()).into())
    }

    pub async fn list(&self) -> Result<Vec<StoredCertificate>, CertificateError> {
        Ok(self.store.list().await?)
    }

    /// Stored certificates matching `filter`, newest first
    pub async fn search(
        &self,
        filter: &CertificateFilter,
    ) -> Result<Vec<StoredCertificate>, CertificateError> {
        let mut certificates = self.list().await?;
        certificates.retain(|c| filter.matches(&c.record));
        Ok(certificates)
    }

    /// Distinct activities of stored certificates, sorted
    pub async fn activities(&self) -> Result<Vec<String>, CertificateError> {
        let activities: BTreeSet<String> = self
            .list()
            .await?
            .into_iter()
            .map(|c| c.record.activity)
            .collect();
        Ok(activities.into_iter().collect())
    }

    /// Apply `update` to a stored record and render it again. The stored
    /// record only changes once both artifacts are saved; a signature in the
    /// update is treated as a fresh upload.
    pub async fn update_certificate(
        &self,
        serial: &str,
        update: CertificateUpdate,
    ) -> Result<GeneratedCertificate, CertificateError> {
        let stored = self.get(serial).await?;
        let fresh_signature = update.has_new_signature();
        let record = update.apply_to(stored.record);

        tracing::info!(serial = %serial, fresh_signature, "Updating certificate");
        self.generate_certificate(record, fresh_signature).await
    }

    /// Remove the record and every stored artifact; returns the number of
    /// files removed
    pub async fn delete_certificate(&self, serial: &str) -> Result<usize, CertificateError> {
        if !self.store.delete(serial).await? {
            return Err(StoreError::NotFound(serial.to_string()).into());
        }
        Ok(self.artifacts.delete(serial).await?)
    }

    /// Current artifact bytes. A missing PDF is rendered on demand into a
    /// temporary file that is gone once this returns.
    pub async fn download_artifact(
        &self,
        serial: &str,
        kind: ArtifactKind,
    ) -> Result<Download, CertificateError> {
        match self.artifacts.find_current(serial, kind).await {
            Ok(artifact) => {
                let bytes = tokio::fs::read(&artifact.path)
                    .await
                    .map_err(|e| StorageError::io(&artifact.path, e))?;
                Ok(Download {
                    file_name: artifact.file_name(),
                    content_type: kind.content_type(),
                    bytes,
                })
            }
            Err(StorageError::NotFound { .. }) if kind == ArtifactKind::Pdf => {
                let temp = self.render_temporary(serial, kind).await?;
                let bytes = temp.read().await?;
                tracing::info!(serial = %serial, bytes = bytes.len(), "Served on-demand PDF");
                Ok(Download {
                    file_name: format!("certificate_{serial}.pdf"),
                    content_type: kind.content_type(),
                    bytes,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn render_temporary(
        &self,
        serial: &str,
        kind: ArtifactKind,
    ) -> Result<TempArtifact, CertificateError> {
        let stored = self.get(serial).await?;
        let signature = SignatureSource::for_record(&stored.record, false);
        let bytes = self.pipeline.render(&stored.record, kind, &signature).await?;
        Ok(self.artifacts.save_temp(&bytes, serial, kind).await?)
    }

    /// Zip the current artifacts of `serials`. Unknown serials and missing
    /// files are skipped; PDFs never stored are rendered temporarily.
    pub async fn download_batch_zip(
        &self,
        serials: &[String],
        kind: ArtifactKind,
    ) -> Result<Vec<u8>, CertificateError> {
        let mut artifacts = Vec::new();
        let mut temporaries = Vec::new();

        for serial in serials {
            match self.artifacts.find_current(serial, kind).await {
                Ok(artifact) => artifacts.push(artifact),
                Err(StorageError::NotFound { .. }) if kind == ArtifactKind::Pdf => {
                    match self.render_temporary(serial, kind).await {
                        Ok(temp) => {
                            artifacts.push(RenderArtifact {
                                kind,
                                path: temp.path().to_path_buf(),
                                serial_number: serial.clone(),
                                created_at: chrono::Utc::now(),
                            });
                            temporaries.push(temp);
                        }
                        Err(e) => {
                            tracing::warn!(serial = %serial, error = %e, "Skipping certificate in zip")
                        }
                    }
                }
                Err(StorageError::NotFound { .. }) => {
                    tracing::debug!(serial = %serial, kind = %kind, "No artifact to bundle");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let bytes = self.batch.package_as_zip(&artifacts, kind).await?;
        drop(temporaries);
        Ok(bytes)
    }

    /// Render `kind` for stored records. Unknown serials are reported as
    /// failures; `None` means every stored record.
    pub async fn generate_batch(
        &self,
        serials: Option<&[String]>,
        kind: ArtifactKind,
    ) -> Result<BatchResult, CertificateError> {
        let mut records = Vec::new();
        let mut missing = Vec::new();

        match serials {
            Some(serials) => {
                for serial in serials {
                    match self.store.get(serial).await? {
                        Some(stored) => records.push(stored.record),
                        None => missing.push(BatchFailure {
                            serial_number: serial.clone(),
                            reason: "NotFound".to_string(),
                            message: format!("Certificate {serial} not found"),
                        }),
                    }
                }
            }
            None => records = self.list().await?.into_iter().map(|c| c.record).collect(),
        }

        let mut result = self.batch.generate_all(&records, kind).await;
        result.failed.extend(missing);
        Ok(result)
    }
}
