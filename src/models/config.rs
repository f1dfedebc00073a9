use crate::assets::AssetLoader;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from config.yaml
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Directory receiving generated certificates
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,

    /// Background raster every certificate is drawn on
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,

    /// Extra fonts loaded into the render engine (system fonts are always loaded)
    #[serde(default)]
    pub fonts_dir: Option<PathBuf>,

    /// Layout override; the embedded layout is used when unset
    #[serde(default)]
    pub layout_file: Option<PathBuf>,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Upper bound on a single composition before it is reported as failed
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// Draw the template into PDF pages
    #[serde(default = "default_true")]
    pub print_background: bool,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("generated-certificates")
}

fn default_template_path() -> PathBuf {
    PathBuf::from("assets/certificate-template.png")
}

fn default_jpeg_quality() -> u8 {
    100
}

fn default_render_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    3000
}

impl AppConfig {
    /// Load configuration from AssetLoader (embedded or external)
    pub fn load_from_assets(loader: &AssetLoader) -> Self {
        let config = match loader.read_config_string() {
            Ok(content) => match serde_yaml::from_str::<Self>(&content) {
                Ok(config) => {
                    tracing::info!(
                        content_dir = %config.content_dir.display(),
                        template = %config.template_path.display(),
                        "Loaded configuration"
                    );
                    config
                }
                Err(e) => {
                    tracing::warn!(%e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(%e, "Failed to read config, using defaults");
                Self::default()
            }
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply CONTENT_DIR, TEMPLATE_PATH, FONTS_DIR, LAYOUT_FILE and PORT
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("CONTENT_DIR") {
            self.content_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("TEMPLATE_PATH") {
            self.template_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("FONTS_DIR") {
            self.fonts_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = lookup("LAYOUT_FILE") {
            self.layout_file = Some(PathBuf::from(path));
        }
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!(port = %port, "Ignoring invalid PORT"),
            }
        }
        self
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            template_path: default_template_path(),
            fonts_dir: None,
            layout_file: None,
            jpeg_quality: default_jpeg_quality(),
            render_timeout_ms: default_render_timeout_ms(),
            print_background: true,
            port: default_port(),
        }
    }
}
