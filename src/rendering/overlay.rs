//! Field binding: certificate record + target layout -> overlay document.
//!
//! Both targets go through the same binding code; only the layout differs.
//! All record text is untrusted and reaches the markup through tera's
//! autoescaping.

use base64::Engine as _;
use serde::Serialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

use crate::assets::AssetLoader;
use crate::error::{ConfigError, RenderError};
use crate::models::{Anchor, Canvas, CertificateRecord, Field, FieldLayout, Target, TargetLayout};

const OVERLAY_TEMPLATE: &str = "overlay.svg";

/// Where the signature for this render comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureSource {
    Absent,
    /// Path kept on the record; unreadable means "no signature"
    Stored(PathBuf),
    /// Uploaded with this request; unreadable is an error
    Fresh(PathBuf),
}

impl SignatureSource {
    pub fn for_record(record: &CertificateRecord, fresh: bool) -> Self {
        match &record.signature_image_path {
            None => SignatureSource::Absent,
            Some(path) if fresh => SignatureSource::Fresh(path.clone()),
            Some(path) => SignatureSource::Stored(path.clone()),
        }
    }
}

/// Decoded signature ready for embedding
#[derive(Debug, Clone)]
pub struct SignatureImage {
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    href: String,
}

impl SignatureImage {
    /// Read and decode a signature file. PNG and JPEG are embedded as-is,
    /// other decodable formats are re-encoded to PNG.
    pub fn from_bytes(source: &Path, bytes: Vec<u8>) -> Result<Self, String> {
        let format = image::guess_format(&bytes).map_err(|e| e.to_string())?;
        let decoded = image::load_from_memory_with_format(&bytes, format).map_err(|e| e.to_string())?;

        let (mime, payload) = match format {
            image::ImageFormat::Png => ("image/png", bytes),
            image::ImageFormat::Jpeg => ("image/jpeg", bytes),
            _ => {
                let mut png = Vec::new();
                decoded
                    .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
                    .map_err(|e| e.to_string())?;
                ("image/png", png)
            }
        };

        Ok(Self {
            source: source.to_path_buf(),
            width: decoded.width(),
            height: decoded.height(),
            href: data_uri(mime, &payload),
        })
    }
}

pub(crate) fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// One bound text element
#[derive(Debug, Clone, Serialize)]
pub struct OverlayText {
    #[serde(skip)]
    pub field: Field,
    pub id: String,
    pub content: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub font_weight: u16,
    pub anchor: Anchor,
    pub underline: bool,
    /// Set when the text is condensed to the layout's max width
    pub fit_width: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverlaySignature {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    href: String,
}

#[derive(Serialize)]
struct OverlayContext<'a> {
    font_family: &'a str,
    color: &'a str,
    texts: &'a [OverlayText],
    signature: Option<&'a OverlaySignature>,
}

/// Field-bound overlay for one target, sized to that target's canvas
#[derive(Debug, Clone)]
pub struct Overlay {
    pub target: Target,
    pub canvas: Canvas,
    pub texts: Vec<OverlayText>,
    pub signature: Option<OverlaySignature>,
    markup: String,
}

impl Overlay {
    /// Escaped overlay markup (an SVG group, no background)
    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        self.texts
            .iter()
            .find(|t| t.field == field)
            .map(|t| t.content.as_str())
    }

    /// Unescaped text lines in render order
    pub fn text_lines(&self) -> Vec<&str> {
        self.texts.iter().map(|t| t.content.as_str()).collect()
    }

    pub fn has_signature(&self) -> bool {
        self.signature.is_some()
    }

    /// Full SVG document: optional background image, then the overlay group
    pub fn document(&self, background_href: Option<&str>) -> String {
        let Canvas { width, height } = self.canvas;
        let background = background_href
            .map(|href| {
                format!(
                    r#"<image x="0" y="0" width="{width}" height="{height}" preserveAspectRatio="xMidYMid slice" href="{href}"/>"#
                )
            })
            .unwrap_or_default();
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">{background}{}</svg>"#,
            self.markup
        )
    }

    /// Standalone overlay document without background
    pub fn to_svg(&self) -> String {
        self.document(None)
    }
}

/// Binds certificate records to target layouts
pub struct FieldRenderer {
    tera: Tera,
}

impl FieldRenderer {
    pub fn new(template_source: &str) -> Result<Self, ConfigError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![".svg"]);
        tera.add_raw_template(OVERLAY_TEMPLATE, template_source)
            .map_err(|e| ConfigError::OverlayTemplate(e.to_string()))?;
        Ok(Self { tera })
    }

    pub fn from_assets(loader: &AssetLoader) -> Result<Self, ConfigError> {
        Self::new(&loader.read_overlay_template()?)
    }

    /// Resolve the signature for a render.
    ///
    /// Stored signatures fail soft (missing or corrupt -> `None`); a fresh
    /// upload that cannot be read is `SignatureUnreadable`.
    pub async fn load_signature(
        &self,
        source: &SignatureSource,
    ) -> Result<Option<SignatureImage>, RenderError> {
        let (path, fresh) = match source {
            SignatureSource::Absent => return Ok(None),
            SignatureSource::Stored(path) => (path, false),
            SignatureSource::Fresh(path) => (path, true),
        };

        let decoded = match tokio::fs::read(path).await {
            Ok(bytes) => SignatureImage::from_bytes(path, bytes),
            Err(e) => Err(e.to_string()),
        };

        match decoded {
            Ok(image) => {
                tracing::debug!(
                    path = %path.display(),
                    width = image.width,
                    height = image.height,
                    "Signature loaded"
                );
                Ok(Some(image))
            }
            Err(reason) if fresh => Err(RenderError::SignatureUnreadable {
                path: path.display().to_string(),
                reason,
            }),
            Err(reason) => {
                tracing::warn!(
                    path = %path.display(),
                    %reason,
                    "Stored signature unreadable, rendering without signature"
                );
                Ok(None)
            }
        }
    }

    /// Bind `record` to `layout`. Pure: no I/O.
    pub fn render(
        &self,
        record: &CertificateRecord,
        layout: &TargetLayout,
        signature: Option<&SignatureImage>,
    ) -> Result<Overlay, RenderError> {
        let texts: Vec<OverlayText> = Field::ALL
            .iter()
            .map(|&field| bind_text(field, field_value(record, field), layout.field(field)))
            .collect();

        let signature = signature.map(|image| {
            let b = layout.signature;
            OverlaySignature {
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
                href: image.href.clone(),
            }
        });

        let context = Context::from_serialize(OverlayContext {
            font_family: &layout.font_family,
            color: &layout.color,
            texts: &texts,
            signature: signature.as_ref(),
        })
        .map_err(|e| RenderError::Overlay(e.to_string()))?;

        let markup = self
            .tera
            .render(OVERLAY_TEMPLATE, &context)
            .map_err(|e| RenderError::Overlay(e.to_string()))?;

        Ok(Overlay {
            target: layout.target,
            canvas: layout.canvas,
            texts,
            signature,
            markup,
        })
    }
}

fn field_value(record: &CertificateRecord, field: Field) -> String {
    match field {
        Field::ParticipantName => record.participant_name.clone(),
        Field::Activity => record.activity.clone(),
        Field::DateIssued => record.formatted_date(),
        Field::ExaminerName => record.examiner_name.clone(),
        Field::ExaminerPosition => record.examiner_position.clone(),
        Field::CompanyCode => record.company_code.clone(),
        Field::ValidationText => format!(
            "This certificate can be validated (ID : {})",
            record.serial_number
        ),
    }
}

fn bind_text(field: Field, content: String, layout: &FieldLayout) -> OverlayText {
    let fit_width = layout
        .max_width
        .filter(|&max| estimate_text_width(&content, layout.font_size, layout.font_weight) > max);

    OverlayText {
        field,
        id: field.element_id(),
        content,
        x: layout.x,
        y: layout.y,
        font_size: layout.font_size,
        font_weight: layout.font_weight,
        anchor: layout.anchor,
        underline: layout.underline,
        fit_width,
    }
}

/// Rough advance width for a geometric sans; bold faces run wider
pub(crate) fn estimate_text_width(text: &str, font_size: f32, font_weight: u16) -> f32 {
    let em = if font_weight >= 600 { 0.64 } else { 0.58 };
    text.chars().count() as f32 * font_size * em
}
