//! Asset loading with embedded fallbacks
//!
//! Configuration, the layout specification and the overlay template ship
//! inside the binary. Each can be overridden from the filesystem:
//!
//! - If no external path is configured: use the embedded asset
//! - If an external path is configured and exists: use it
//! - If an external path is configured but missing: warn and use the embedded asset

use rust_embed::RustEmbed;
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Embedded default assets
#[derive(RustEmbed)]
#[folder = "assets/"]
#[include = "*.yaml"]
#[include = "*.svg"]
struct EmbeddedAssets;

pub const CONFIG_ASSET: &str = "config.yaml";
pub const LAYOUT_ASSET: &str = "layout.yaml";
pub const OVERLAY_ASSET: &str = "overlay.svg";

/// Asset category for selective operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetCategory {
    Config,
    Layout,
    Overlay,
}

impl AssetCategory {
    pub const ALL: [AssetCategory; 3] = [
        AssetCategory::Config,
        AssetCategory::Layout,
        AssetCategory::Overlay,
    ];

    fn asset_name(&self) -> &'static str {
        match self {
            AssetCategory::Config => CONFIG_ASSET,
            AssetCategory::Layout => LAYOUT_ASSET,
            AssetCategory::Overlay => OVERLAY_ASSET,
        }
    }
}

/// Report of init (extraction) operations
#[derive(Debug, Default)]
pub struct InitReport {
    pub written: Vec<String>,
    pub skipped: Vec<String>,
}

/// Asset loader with optional filesystem overrides
#[derive(Debug, Clone, Default)]
pub struct AssetLoader {
    /// External config file path (from CONFIG_FILE env var)
    config_file: Option<PathBuf>,
    /// External layout file path (from LAYOUT_FILE env var or config)
    layout_file: Option<PathBuf>,
    /// External overlay template path (from OVERLAY_FILE env var)
    overlay_file: Option<PathBuf>,
}

impl AssetLoader {
    /// Paths should be `Some` only if an override was requested.
    pub fn new(config_file: Option<PathBuf>, layout_file: Option<PathBuf>) -> Self {
        Self {
            config_file,
            layout_file,
            overlay_file: None,
        }
    }

    pub fn with_overlay_file(mut self, path: Option<PathBuf>) -> Self {
        self.overlay_file = path;
        self
    }

    /// Use `path` as the layout source unless one is already set
    pub fn with_layout_fallback(mut self, path: Option<PathBuf>) -> Self {
        if self.layout_file.is_none() {
            self.layout_file = path;
        }
        self
    }

    fn read(&self, external: Option<&Path>, name: &str) -> io::Result<Cow<'static, [u8]>> {
        if let Some(path) = external {
            if path.exists() {
                tracing::trace!(path = %path.display(), "Loading asset from filesystem");
                return Ok(Cow::Owned(fs::read(path)?));
            }
            tracing::warn!(
                path = %path.display(),
                asset = name,
                "Configured asset path does not exist, using embedded default"
            );
        }

        EmbeddedAssets::get(name)
            .map(|f| {
                tracing::trace!(asset = name, "Loading asset from embedded assets");
                f.data
            })
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Embedded asset not found: {name}"),
                )
            })
    }

    fn read_string(&self, external: Option<&Path>, name: &str) -> io::Result<String> {
        let bytes = self.read(external, name)?;
        String::from_utf8(bytes.into_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Read config as a UTF-8 string
    pub fn read_config_string(&self) -> io::Result<String> {
        self.read_string(self.config_file.as_deref(), CONFIG_ASSET)
    }

    /// Read the layout specification source
    pub fn read_layout_string(&self) -> Result<String, ConfigError> {
        self.read_string(self.layout_file.as_deref(), LAYOUT_ASSET)
            .map_err(|source| ConfigError::Read {
                path: self
                    .layout_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| LAYOUT_ASSET.to_string()),
                source,
            })
    }

    /// Read the tera template used to produce overlay markup
    pub fn read_overlay_template(&self) -> Result<String, ConfigError> {
        self.read_string(self.overlay_file.as_deref(), OVERLAY_ASSET)
            .map_err(|source| ConfigError::Read {
                path: self
                    .overlay_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| OVERLAY_ASSET.to_string()),
                source,
            })
    }

    /// Extract embedded assets into `dir` (init command)
    pub fn init(dir: &Path, categories: &[AssetCategory], force: bool) -> io::Result<InitReport> {
        let mut report = InitReport::default();
        fs::create_dir_all(dir)?;

        for category in categories {
            let name = category.asset_name();
            let path = dir.join(name);
            if !force && path.exists() {
                report.skipped.push(path.display().to_string());
                continue;
            }
            if let Some(data) = EmbeddedAssets::get(name) {
                fs::write(&path, &*data.data)?;
                report.written.push(path.display().to_string());
            }
        }

        Ok(report)
    }

    /// List embedded assets (for display)
    pub fn list_embedded() -> Vec<String> {
        let mut names: Vec<String> = EmbeddedAssets::iter().map(|s| s.to_string()).collect();
        names.sort();
        names
    }
}
