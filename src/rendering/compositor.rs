//! Composition engine: template + overlay -> JPEG or PDF bytes.
//!
//! Owns the single rendering resource. At most one composition runs at a
//! time; further requests queue on the engine slot's mutex. The slot guard
//! moves into the blocking render task, so it is released when that task
//! ends no matter what happens to the caller.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::engine::{EngineLauncher, Rasterized, RenderEngine, TextBox};
use super::jpeg;
use super::overlay::{data_uri, estimate_text_width, Overlay, OverlayText};
use super::pdf::{self, TextRun};
use crate::error::RenderError;
use crate::models::{Anchor, AppConfig};

type EngineSlot = Arc<Mutex<Option<Box<dyn RenderEngine>>>>;

#[derive(Debug, Clone, Copy)]
pub struct ComposeSettings {
    pub jpeg_quality: u8,
    /// Draw the template into PDF pages
    pub print_background: bool,
    /// Bound on one composition, launch included
    pub render_timeout: Duration,
}

impl ComposeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            print_background: config.print_background,
            render_timeout: config.render_timeout(),
        }
    }
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Background raster, read fresh for every record
#[derive(Debug, Clone)]
pub struct TemplateImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    href: String,
}

impl TemplateImage {
    pub async fn load(path: &Path) -> Result<Self, RenderError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RenderError::TemplateNotFound(path.display().to_string()));
            }
            Err(e) => return Err(RenderError::Io(e)),
        };
        Self::from_bytes(path, bytes)
    }

    pub fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<Self, RenderError> {
        let invalid = |reason: String| {
            RenderError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("template {}: {reason}", path.display()),
            ))
        };

        let format = image::guess_format(&bytes).map_err(|e| invalid(e.to_string()))?;
        let mime = match format {
            image::ImageFormat::Png => "image/png",
            image::ImageFormat::Jpeg => "image/jpeg",
            image::ImageFormat::Gif => "image/gif",
            other => return Err(invalid(format!("unsupported format {other:?}"))),
        };
        let (width, height) = image::ImageReader::with_format(Cursor::new(&bytes), format)
            .into_dimensions()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            href: data_uri(mime, &bytes),
        })
    }

    pub fn href(&self) -> &str {
        &self.href
    }
}

#[derive(Clone)]
pub struct Compositor {
    slot: EngineSlot,
    launcher: Arc<dyn EngineLauncher>,
    settings: ComposeSettings,
}

impl Compositor {
    pub fn new(launcher: Arc<dyn EngineLauncher>, settings: ComposeSettings) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            launcher,
            settings,
        }
    }

    pub fn settings(&self) -> &ComposeSettings {
        &self.settings
    }

    /// Launch the engine now instead of on first use
    pub async fn warm_up(&self) -> Result<(), RenderError> {
        let mut guard = self.slot.clone().lock_owned().await;
        let launcher = self.launcher.clone();
        tokio::task::spawn_blocking(move || acquire_engine(&mut guard, launcher.as_ref()).map(|_| ()))
            .await
            .map_err(|e| RenderError::EngineUnavailable(format!("launch task failed: {e}")))?
    }

    /// Template + overlay as a JPEG at the overlay's canvas size. The bound
    /// text lines are embedded as the JPEG comment.
    pub async fn compose_raster(
        &self,
        template: &TemplateImage,
        overlay: &Overlay,
    ) -> Result<Vec<u8>, RenderError> {
        let document = overlay.document(Some(template.href()));
        let comment = overlay.text_lines().join("\n");
        let quality = self.settings.jpeg_quality;

        self.compose(overlay, document, move |raster| {
            jpeg::encode_rgb(&raster.rgb, raster.width, raster.height, quality, Some(&comment))
        })
        .await
    }

    /// One-page PDF sized to the overlay's canvas, with an invisible text layer
    pub async fn compose_pdf(
        &self,
        template: &TemplateImage,
        overlay: &Overlay,
    ) -> Result<Vec<u8>, RenderError> {
        let background = self.settings.print_background.then(|| template.href());
        let document = overlay.document(background);
        let texts = overlay.texts.clone();
        let canvas = overlay.canvas;
        let quality = self.settings.jpeg_quality;

        self.compose(overlay, document, move |raster| {
            let page = jpeg::encode_rgb(&raster.rgb, raster.width, raster.height, quality, None)?;
            let runs = text_runs(&texts, &raster.text_boxes);
            pdf::write_page(canvas, &page, &runs)
        })
        .await
    }

    async fn compose<F>(
        &self,
        overlay: &Overlay,
        document: String,
        finish: F,
    ) -> Result<Vec<u8>, RenderError>
    where
        F: FnOnce(Rasterized) -> Result<Vec<u8>, RenderError> + Send + 'static,
    {
        let canvas = overlay.canvas;
        let text_ids: Vec<String> = overlay.texts.iter().map(|t| t.id.clone()).collect();
        let launcher = self.launcher.clone();

        let queued = Instant::now();
        let mut guard = self.slot.clone().lock_owned().await;
        let waited = queued.elapsed();

        let task = tokio::task::spawn_blocking(move || {
            let engine = acquire_engine(&mut guard, launcher.as_ref())?;
            match engine.rasterize(&document, canvas, &text_ids) {
                Ok(raster) => finish(raster),
                Err(e) => {
                    if matches!(e, RenderError::EngineUnavailable(_)) {
                        *guard = None;
                    }
                    Err(e)
                }
            }
        });

        let started = Instant::now();
        match tokio::time::timeout(self.settings.render_timeout, task).await {
            Ok(Ok(result)) => {
                tracing::debug!(
                    output = %overlay.target,
                    width = canvas.width,
                    height = canvas.height,
                    queued_ms = waited.as_millis() as u64,
                    render_ms = started.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "Composition finished"
                );
                result
            }
            Ok(Err(join_error)) => {
                // The task is gone, so the slot is free again; drop the engine it used
                self.slot.lock().await.take();
                Err(RenderError::EngineUnavailable(format!(
                    "render task failed: {join_error}"
                )))
            }
            Err(_) => {
                tracing::warn!(
                    output = %overlay.target,
                    timeout_ms = self.settings.render_timeout.as_millis() as u64,
                    "Composition timed out"
                );
                Err(RenderError::EngineUnavailable(format!(
                    "composition did not finish within {} ms",
                    self.settings.render_timeout.as_millis()
                )))
            }
        }
    }
}

/// Return the running engine, launching it if needed. A failed launch is
/// retried once with a fresh instance.
fn acquire_engine<'a>(
    slot: &'a mut Option<Box<dyn RenderEngine>>,
    launcher: &dyn EngineLauncher,
) -> Result<&'a mut (dyn RenderEngine + 'static), RenderError> {
    if slot.is_none() {
        let engine = match launcher.launch() {
            Ok(engine) => engine,
            Err(first) => {
                tracing::warn!(error = %first, "Render engine launch failed, retrying");
                launcher.launch().map_err(into_unavailable)?
            }
        };
        *slot = Some(engine);
    }
    slot.as_deref_mut()
        .ok_or_else(|| RenderError::EngineUnavailable("engine slot empty".to_string()))
}

fn into_unavailable(e: RenderError) -> RenderError {
    match e {
        RenderError::EngineUnavailable(_) => e,
        other => RenderError::EngineUnavailable(other.to_string()),
    }
}

/// Place each bound text over its rendered glyphs. Elements the engine could
/// not measure fall back to an estimate around the anchor point.
fn text_runs(texts: &[OverlayText], boxes: &HashMap<String, TextBox>) -> Vec<TextRun> {
    texts
        .iter()
        .map(|text| {
            let (x, width) = match boxes.get(&text.id) {
                Some(b) => (b.x, b.width),
                None => {
                    let width = text.fit_width.unwrap_or_else(|| {
                        estimate_text_width(&text.content, text.font_size, text.font_weight)
                    });
                    let x = match text.anchor {
                        Anchor::Start => text.x,
                        Anchor::Middle => text.x - width / 2.0,
                        Anchor::End => text.x - width,
                    };
                    (x, width)
                }
            };
            TextRun {
                content: text.content.clone(),
                x,
                baseline: text.y,
                width,
                font_size: text.font_size,
                bold: text.font_weight >= 600,
            }
        })
        .collect()
}
