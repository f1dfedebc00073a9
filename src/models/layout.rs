//! Layout specification: where each certificate field goes, per output target.
//!
//! Each target is authored in its own pixel space. The two layouts are not
//! derived from one another; they must be reviewed together whenever one changes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::assets::AssetLoader;
use crate::error::ConfigError;

/// Output target with its own canvas and field positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// High-resolution raster preview (JPEG)
    Preview,
    /// Print-oriented PDF page
    Pdf,
}

impl Target {
    pub const ALL: [Target; 2] = [Target::Preview, Target::Pdf];

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Preview => "preview",
            Target::Pdf => "pdf",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic text fields bound from a certificate record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    ParticipantName,
    Activity,
    DateIssued,
    ExaminerName,
    ExaminerPosition,
    CompanyCode,
    ValidationText,
}

impl Field {
    /// Render order; also the order of lines in embedded text metadata
    pub const ALL: [Field; 7] = [
        Field::ParticipantName,
        Field::Activity,
        Field::DateIssued,
        Field::ExaminerName,
        Field::ExaminerPosition,
        Field::CompanyCode,
        Field::ValidationText,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::ParticipantName => "participant_name",
            Field::Activity => "activity",
            Field::DateIssued => "date_issued",
            Field::ExaminerName => "examiner_name",
            Field::ExaminerPosition => "examiner_position",
            Field::CompanyCode => "company_code",
            Field::ValidationText => "validation_text",
        }
    }

    /// Element id used in the overlay markup
    pub fn element_id(&self) -> String {
        self.as_str().replace('_', "-")
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Horizontal alignment of a text field around its anchor point; serializes
/// to the SVG `text-anchor` value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    Start,
    #[default]
    Middle,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

/// Position and typography of one text field; `y` is the text baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub anchor: Anchor,
    pub font_size: f32,
    #[serde(default = "default_weight")]
    pub font_weight: u16,
    #[serde(default)]
    pub underline: bool,
    /// Text estimated wider than this is condensed to fit
    #[serde(default)]
    pub max_width: Option<f32>,
}

fn default_weight() -> u16 {
    400
}

/// Signature bounding box; the image is fitted inside, aspect preserved
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignatureBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTargetLayout {
    canvas: Canvas,
    #[serde(default = "default_font_family")]
    font_family: String,
    #[serde(default = "default_color")]
    color: String,
    #[serde(default)]
    fields: HashMap<Field, FieldLayout>,
    signature: Option<SignatureBox>,
}

fn default_font_family() -> String {
    "Montserrat, sans-serif".to_string()
}

fn default_color() -> String {
    "black".to_string()
}

#[derive(Debug, Deserialize)]
struct RawLayout {
    version: Option<u32>,
    #[serde(default)]
    targets: HashMap<Target, RawTargetLayout>,
}

/// Complete layout of one target. Constructed only through validation, so
/// every field lookup succeeds.
#[derive(Debug, Clone)]
pub struct TargetLayout {
    pub target: Target,
    pub canvas: Canvas,
    pub font_family: String,
    pub color: String,
    pub signature: SignatureBox,
    fields: HashMap<Field, FieldLayout>,
}

impl TargetLayout {
    pub fn field(&self, field: Field) -> &FieldLayout {
        // Presence of every Field is checked in LayoutSpec::from_yaml
        &self.fields[&field]
    }
}

/// Validated layout for both targets
#[derive(Debug, Clone)]
pub struct LayoutSpec {
    pub version: u32,
    preview: TargetLayout,
    pdf: TargetLayout,
}

impl LayoutSpec {
    /// Parse and validate a layout document. Missing targets or fields are
    /// configuration errors here, never at render time.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut raw: RawLayout =
            serde_yaml::from_str(content).map_err(|e| ConfigError::LayoutParse(e.to_string()))?;

        let mut take = |target: Target| -> Result<TargetLayout, ConfigError> {
            let raw_target = raw
                .targets
                .remove(&target)
                .ok_or(ConfigError::MissingTarget(target))?;
            validate_target(target, raw_target)
        };

        let preview = take(Target::Preview)?;
        let pdf = take(Target::Pdf)?;

        Ok(Self {
            version: raw.version.unwrap_or(1),
            preview,
            pdf,
        })
    }

    /// Load the layout through the asset loader (external file or embedded default)
    pub fn load_from_assets(loader: &AssetLoader) -> Result<Self, ConfigError> {
        let content = loader.read_layout_string()?;
        let spec = Self::from_yaml(&content)?;
        tracing::info!(
            version = spec.version,
            preview = %format!("{}x{}", spec.preview.canvas.width, spec.preview.canvas.height),
            pdf = %format!("{}x{}", spec.pdf.canvas.width, spec.pdf.canvas.height),
            "Loaded layout specification"
        );
        Ok(spec)
    }

    pub fn target(&self, target: Target) -> &TargetLayout {
        match target {
            Target::Preview => &self.preview,
            Target::Pdf => &self.pdf,
        }
    }

    pub fn field_layout(&self, target: Target, field: Field) -> &FieldLayout {
        self.target(target).field(field)
    }
}

fn validate_target(target: Target, raw: RawTargetLayout) -> Result<TargetLayout, ConfigError> {
    if raw.canvas.width == 0 || raw.canvas.height == 0 {
        return Err(ConfigError::InvalidCanvas {
            target,
            width: raw.canvas.width,
            height: raw.canvas.height,
        });
    }

    if let Some(field) = Field::ALL
        .iter()
        .find(|field| !raw.fields.contains_key(field))
    {
        return Err(ConfigError::MissingField {
            target,
            field: *field,
        });
    }

    let signature = raw.signature.ok_or_else(|| {
        ConfigError::LayoutParse(format!("target '{target}' has no signature box"))
    })?;

    Ok(TargetLayout {
        target,
        canvas: raw.canvas,
        font_family: raw.font_family,
        color: raw.color,
        signature,
        fields: raw.fields,
    })
}
