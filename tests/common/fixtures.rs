//! Test fixtures: records, template images and instrumented render engines.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use certforge::error::RenderError;
use certforge::models::{Canvas, CertificateRecord};
use certforge::rendering::{EngineLauncher, Rasterized, RenderEngine};

/// Layout with small canvases (same aspect ratios as the embedded layout)
pub const SMALL_LAYOUT: &str = r#"
version: 3
targets:
  preview:
    canvas: { width: 350, height: 248 }
    signature: { x: 148, y: 158, width: 55, height: 25 }
    fields:
      participant_name: { x: 175, y: 107, font_size: 14, font_weight: 700 }
      activity: { x: 175, y: 143, font_size: 7.5, font_weight: 600, max_width: 315 }
      date_issued: { x: 175, y: 150, font_size: 4 }
      examiner_name: { x: 175, y: 201, font_size: 8.5, font_weight: 600 }
      examiner_position: { x: 175, y: 212, font_size: 8, underline: true }
      company_code: { x: 9.5, y: 216, font_size: 4, font_weight: 700, anchor: start }
      validation_text: { x: 9.5, y: 223, font_size: 4.3, anchor: start }
  pdf:
    canvas: { width: 175, height: 124 }
    signature: { x: 73, y: 80, width: 30, height: 15 }
    fields:
      participant_name: { x: 87.5, y: 54, font_size: 7.5, font_weight: 700 }
      activity: { x: 87.5, y: 73, font_size: 4, font_weight: 600, max_width: 158 }
      date_issued: { x: 87.5, y: 76, font_size: 2.5 }
      examiner_name: { x: 87.5, y: 102, font_size: 5, font_weight: 600 }
      examiner_position: { x: 87.5, y: 106, font_size: 4, underline: true }
      company_code: { x: 5, y: 108, font_size: 2.3, font_weight: 700, anchor: start }
      validation_text: { x: 5, y: 111, font_size: 2.1, anchor: start }
"#;

/// Serial numbers used across tests
pub mod serials {
    pub const PRIMARY: &str = "C-1001";
    pub const SECOND: &str = "C-1002";
    pub const THIRD: &str = "C-1003";
}

pub fn record(serial: &str) -> CertificateRecord {
    CertificateRecord {
        serial_number: serial.to_string(),
        participant_name: "Ada Lovelace".to_string(),
        activity: "Intro to Algorithms".to_string(),
        examiner_name: "Grace Hopper".to_string(),
        examiner_position: "Lead Instructor".to_string(),
        company_code: "ACM-01".to_string(),
        date_issued: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        signature_image_path: None,
    }
}

/// The record as a JSON request body
pub fn record_json(serial: &str) -> String {
    serde_json::to_string(&record(serial)).unwrap()
}

pub fn png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

/// Write a pale template background to `path`
pub fn write_template(path: &Path) {
    std::fs::write(path, png_bytes(70, 50, [250, 244, 230])).unwrap();
}

/// Counters shared by every engine a [`ProbeLauncher`] creates
#[derive(Debug, Default)]
pub struct Probe {
    pub launches: AtomicUsize,
    pub rasterized: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl Probe {
    pub fn rasterized(&self) -> usize {
        self.rasterized.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

/// Action run after the n-th rasterization (1-based)
pub type AfterRaster = Box<dyn Fn(usize) + Send + Sync>;

/// Engine that paints a white canvas, records overlap and runs a hook
struct ProbeEngine {
    probe: Arc<Probe>,
    delay: Duration,
    after: Arc<Option<AfterRaster>>,
}

impl RenderEngine for ProbeEngine {
    fn rasterize(
        &mut self,
        _document: &str,
        canvas: Canvas,
        _text_ids: &[String],
    ) -> Result<Rasterized, RenderError> {
        let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);

        let n = self.probe.rasterized.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(after) = self.after.as_ref() {
            after(n);
        }

        Ok(Rasterized {
            width: canvas.width,
            height: canvas.height,
            rgb: vec![255; (canvas.width * canvas.height * 3) as usize],
            text_boxes: HashMap::new(),
        })
    }
}

/// Launcher for instrumented engines
pub struct ProbeLauncher {
    pub probe: Arc<Probe>,
    delay: Duration,
    after: Arc<Option<AfterRaster>>,
}

impl ProbeLauncher {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(Probe::default()),
            delay: Duration::ZERO,
            after: Arc::new(None),
        }
    }

    /// Each rasterization holds the engine for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn after_raster(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.after = Arc::new(Some(Box::new(hook)));
        self
    }

    /// Move the template away once `n` rasterizations have completed
    pub fn removing_template_after(self, n: usize, template: PathBuf) -> Self {
        self.after_raster(move |count| {
            if count == n {
                let _ = std::fs::rename(&template, template.with_extension("moved"));
            }
        })
    }
}

impl Default for ProbeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineLauncher for ProbeLauncher {
    fn launch(&self) -> Result<Box<dyn RenderEngine>, RenderError> {
        self.probe.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ProbeEngine {
            probe: self.probe.clone(),
            delay: self.delay,
            after: self.after.clone(),
        }))
    }
}
