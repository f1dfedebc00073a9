use crate::error::StoreError;
use crate::models::{CertificateRecord, StoredCertificate};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Trait for certificate metadata storage
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Find a certificate by serial number
    async fn get(&self, serial: &str) -> Result<Option<StoredCertificate>, StoreError>;

    /// Store a new certificate; fails with `Conflict` if the serial exists
    async fn insert(&self, record: CertificateRecord) -> Result<StoredCertificate, StoreError>;

    /// Store or update a certificate, keeping its creation time
    async fn upsert(&self, record: CertificateRecord) -> Result<StoredCertificate, StoreError>;

    /// Remove a certificate; `false` if it did not exist
    async fn delete(&self, serial: &str) -> Result<bool, StoreError>;

    /// All certificates, newest first
    async fn list(&self) -> Result<Vec<StoredCertificate>, StoreError>;
}

/// In-memory certificate metadata storage
pub struct InMemoryCertificateStore {
    certificates: Arc<RwLock<HashMap<String, StoredCertificate>>>,
}

impl InMemoryCertificateStore {
    pub fn new() -> Self {
        Self {
            certificates: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryCertificateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CertificateStore for InMemoryCertificateStore {
    async fn get(&self, serial: &str) -> Result<Option<StoredCertificate>, StoreError> {
        let certificates = self.certificates.read().await;
        Ok(certificates.get(serial).cloned())
    }

    async fn insert(&self, record: CertificateRecord) -> Result<StoredCertificate, StoreError> {
        let mut certificates = self.certificates.write().await;
        if certificates.contains_key(&record.serial_number) {
            return Err(StoreError::Conflict(record.serial_number));
        }
        let now = Utc::now();
        let stored = StoredCertificate {
            record,
            created_at: now,
            updated_at: now,
        };
        certificates.insert(stored.record.serial_number.clone(), stored.clone());
        Ok(stored)
    }

    async fn upsert(&self, record: CertificateRecord) -> Result<StoredCertificate, StoreError> {
        let mut certificates = self.certificates.write().await;
        let now = Utc::now();
        let created_at = certificates
            .get(&record.serial_number)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        let stored = StoredCertificate {
            record,
            created_at,
            updated_at: now,
        };
        certificates.insert(stored.record.serial_number.clone(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, serial: &str) -> Result<bool, StoreError> {
        let mut certificates = self.certificates.write().await;
        Ok(certificates.remove(serial).is_some())
    }

    async fn list(&self) -> Result<Vec<StoredCertificate>, StoreError> {
        let certificates = self.certificates.read().await;
        let mut all: Vec<_> = certificates.values().cloned().collect();
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.record.serial_number.cmp(&b.record.serial_number))
        });
        Ok(all)
    }
}
