pub mod artifact;
pub mod config;
pub mod layout;
pub mod record;

pub use artifact::{ArtifactKind, BatchFailure, BatchResult, RenderArtifact};
pub use config::AppConfig;
pub use layout::{Anchor, Canvas, Field, FieldLayout, LayoutSpec, SignatureBox, Target, TargetLayout};
pub use record::{
    format_issue_date, CertificateFilter, CertificateRecord, CertificateUpdate, StoredCertificate,
};
