use resvg::usvg::{self, fontdb, Transform};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tiny_skia::Pixmap;

use crate::error::RenderError;
use crate::models::Canvas;

/// Rendered text element extent in canvas pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Output of one rasterization: opaque RGB pixels plus measured text boxes
#[derive(Debug, Clone)]
pub struct Rasterized {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    /// Keyed by element id; ids that produced no glyphs are absent
    pub text_boxes: HashMap<String, TextBox>,
}

/// The heavyweight rendering resource. Used by at most one composition at
/// a time; implementations need not be `Sync`.
pub trait RenderEngine: Send {
    /// Render `document` onto a white canvas of exactly `canvas` pixels and
    /// measure the elements named in `text_ids`.
    fn rasterize(
        &mut self,
        document: &str,
        canvas: Canvas,
        text_ids: &[String],
    ) -> Result<Rasterized, RenderError>;
}

/// Creates render engines. Launching is the expensive step.
pub trait EngineLauncher: Send + Sync {
    fn launch(&self) -> Result<Box<dyn RenderEngine>, RenderError>;
}

/// resvg-backed engine holding a loaded font database
pub struct SvgEngine {
    fontdb: Arc<fontdb::Database>,
}

impl SvgEngine {
    pub fn new(fontdb: Arc<fontdb::Database>) -> Self {
        Self { fontdb }
    }
}

impl RenderEngine for SvgEngine {
    fn rasterize(
        &mut self,
        document: &str,
        canvas: Canvas,
        text_ids: &[String],
    ) -> Result<Rasterized, RenderError> {
        let options = usvg::Options {
            fontdb: self.fontdb.clone(),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(document, &options)
            .map_err(|e| RenderError::SvgParse(e.to_string()))?;

        let svg_size = tree.size();
        let scale_x = canvas.width as f32 / svg_size.width();
        let scale_y = canvas.height as f32 / svg_size.height();

        let mut pixmap =
            Pixmap::new(canvas.width, canvas.height).ok_or(RenderError::PixmapAllocation)?;
        pixmap.fill(tiny_skia::Color::WHITE);
        resvg::render(
            &tree,
            Transform::from_scale(scale_x, scale_y),
            &mut pixmap.as_mut(),
        );

        let text_boxes = text_ids
            .iter()
            .filter_map(|id| {
                let bbox = tree.node_by_id(id)?.abs_bounding_box();
                Some((
                    id.clone(),
                    TextBox {
                        x: bbox.x() * scale_x,
                        y: bbox.y() * scale_y,
                        width: bbox.width() * scale_x,
                        height: bbox.height() * scale_y,
                    },
                ))
            })
            .collect();

        // Background is opaque white, so premultiplied == straight RGB
        let rgb = pixmap
            .data()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        Ok(Rasterized {
            width: canvas.width,
            height: canvas.height,
            rgb,
            text_boxes,
        })
    }
}

/// Launches [`SvgEngine`]s with system fonts plus an optional fonts directory
#[derive(Debug, Clone, Default)]
pub struct SvgEngineLauncher {
    fonts_dir: Option<PathBuf>,
}

impl SvgEngineLauncher {
    pub fn new(fonts_dir: Option<PathBuf>) -> Self {
        Self { fonts_dir }
    }
}

impl EngineLauncher for SvgEngineLauncher {
    fn launch(&self) -> Result<Box<dyn RenderEngine>, RenderError> {
        let mut fontdb = fontdb::Database::new();

        if let Some(dir) = &self.fonts_dir {
            if !dir.is_dir() {
                return Err(RenderError::EngineUnavailable(format!(
                    "fonts directory {} does not exist",
                    dir.display()
                )));
            }
            fontdb.load_fonts_dir(dir);
            tracing::debug!(dir = %dir.display(), fonts = fontdb.len(), "Loaded fonts directory");
        }

        fontdb.load_system_fonts();

        if fontdb.len() == 0 {
            tracing::warn!("No fonts available, certificate text will not be drawn");
        }
        tracing::info!(font_count = fontdb.len(), "Render engine launched");

        Ok(Box::new(SvgEngine::new(Arc::new(fontdb))))
    }
}
