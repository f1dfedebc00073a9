//! Certforge - certificate rendering server
//!
//! Binds certificate records onto a raster template through an SVG overlay
//! and exports each certificate as a JPEG preview and a printable PDF.
//! This library exposes modules for integration testing.

pub mod api;
pub mod assets;
pub mod error;
pub mod models;
pub mod rendering;
pub mod server;
pub mod services;

#[cfg(test)]
mod test_support;
