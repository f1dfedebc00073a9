pub mod compositor;
pub mod engine;
pub mod jpeg;
pub mod overlay;
pub mod pdf;

pub use compositor::{ComposeSettings, Compositor, TemplateImage};
pub use engine::{EngineLauncher, Rasterized, RenderEngine, SvgEngine, SvgEngineLauncher, TextBox};
pub use overlay::{FieldRenderer, Overlay, OverlaySignature, OverlayText, SignatureImage, SignatureSource};
