pub mod artifact_store;
pub mod batch;
pub mod certificate_service;
pub mod certificate_store;
pub mod pipeline;

pub use artifact_store::{ArtifactStore, TempArtifact};
pub use batch::BatchOrchestrator;
pub use certificate_service::{CertificateService, Download, GeneratedCertificate};
pub use certificate_store::{CertificateStore, InMemoryCertificateStore};
pub use pipeline::{RenderPipeline, RenderedPair};
