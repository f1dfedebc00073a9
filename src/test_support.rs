//! Shared fixtures for unit tests

use chrono::NaiveDate;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::RenderError;
use crate::models::{Canvas, CertificateRecord};
use crate::rendering::{EngineLauncher, Rasterized, RenderEngine};

/// Layout with tiny canvases so tests rasterize quickly. Same aspect ratios
/// as the production layout.
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

pub fn sample_record(serial: &str) -> CertificateRecord {
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

/// 4x2 opaque PNG
pub fn tiny_png() -> Vec<u8> {
    png_bytes(4, 2, [20, 40, 200])
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

/// Engine that paints nothing and records the documents it was given
pub struct FakeEngine {
    documents: Arc<Mutex<Vec<String>>>,
    delay: Duration,
}

impl RenderEngine for FakeEngine {
    fn rasterize(
        &mut self,
        document: &str,
        canvas: Canvas,
        _text_ids: &[String],
    ) -> Result<Rasterized, RenderError> {
        std::thread::sleep(self.delay);
        self.documents.lock().unwrap().push(document.to_string());
        Ok(Rasterized {
            width: canvas.width,
            height: canvas.height,
            rgb: vec![255; (canvas.width * canvas.height * 3) as usize],
            text_boxes: HashMap::new(),
        })
    }
}

/// Launcher for [`FakeEngine`]s; fails the first `failures` launches
#[derive(Default)]
pub struct FakeLauncher {
    pub launches: AtomicUsize,
    pub documents: Arc<Mutex<Vec<String>>>,
    pub failures: usize,
    pub delay: Duration,
}

impl FakeLauncher {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures,
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl EngineLauncher for FakeLauncher {
    fn launch(&self) -> Result<Box<dyn RenderEngine>, RenderError> {
        let n = self.launches.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(RenderError::EngineUnavailable(format!("launch {n} refused")));
        }
        Ok(Box::new(FakeEngine {
            documents: self.documents.clone(),
            delay: self.delay,
        }))
    }
}
