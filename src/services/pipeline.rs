//! From record to encoded bytes: overlay, template and signature loaded per
//! render, then composed onto the shared engine for either output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::RenderError;
use crate::models::{ArtifactKind, CertificateRecord, LayoutSpec};
use crate::rendering::{Compositor, FieldRenderer, SignatureImage, SignatureSource, TemplateImage};

/// Record -> artifact bytes: template load, field binding, composition
pub struct RenderPipeline {
    renderer: FieldRenderer,
    compositor: Compositor,
    layout: Arc<LayoutSpec>,
    template_path: PathBuf,
}

/// Both renders of one record
pub struct RenderedPair {
    pub raster: Vec<u8>,
    pub pdf: Vec<u8>,
}

impl RenderPipeline {
    pub fn new(
        renderer: FieldRenderer,
        compositor: Compositor,
        layout: Arc<LayoutSpec>,
        template_path: PathBuf,
    ) -> Self {
        Self {
            renderer,
            compositor,
            layout,
            template_path,
        }
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    pub fn layout(&self) -> &LayoutSpec {
        &self.layout
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    async fn inputs(
        &self,
        signature: &SignatureSource,
    ) -> Result<(TemplateImage, Option<SignatureImage>), RenderError> {
        let template = TemplateImage::load(&self.template_path).await?;
        let signature = self.renderer.load_signature(signature).await?;
        Ok((template, signature))
    }

    /// Render one artifact kind
    pub async fn render(
        &self,
        record: &CertificateRecord,
        kind: ArtifactKind,
        signature: &SignatureSource,
    ) -> Result<Vec<u8>, RenderError> {
        let (template, signature) = self.inputs(signature).await?;
        self.compose(record, kind, &template, signature.as_ref()).await
    }

    /// Render raster and PDF from the same template and signature read
    pub async fn render_both(
        &self,
        record: &CertificateRecord,
        signature: &SignatureSource,
    ) -> Result<RenderedPair, RenderError> {
        let (template, signature) = self.inputs(signature).await?;
        let raster = self
            .compose(record, ArtifactKind::Raster, &template, signature.as_ref())
            .await?;
        let pdf = self
            .compose(record, ArtifactKind::Pdf, &template, signature.as_ref())
            .await?;
        Ok(RenderedPair { raster, pdf })
    }

    async fn compose(
        &self,
        record: &CertificateRecord,
        kind: ArtifactKind,
        template: &TemplateImage,
        signature: Option<&SignatureImage>,
    ) -> Result<Vec<u8>, RenderError> {
        let overlay = self
            .renderer
            .render(record, self.layout.target(kind.target()), signature)?;

        tracing::debug!(
            serial = %record.serial_number,
            kind = %kind,
            signature = overlay.has_signature(),
            "Composing certificate"
        );

        match kind {
            ArtifactKind::Raster => self.compositor.compose_raster(template, &overlay).await,
            ArtifactKind::Pdf => self.compositor.compose_pdf(template, &overlay).await,
        }
    }
}
