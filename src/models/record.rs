use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{FieldError, ValidationError};

/// Longest serial number accepted; it becomes part of artifact filenames
pub const MAX_SERIAL_LEN: usize = 128;

/// Certificate data bound onto the template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    pub serial_number: String,
    pub participant_name: String,
    pub activity: String,
    pub examiner_name: String,
    pub examiner_position: String,
    pub company_code: String,
    pub date_issued: NaiveDate,
    /// Path to a previously uploaded signature image; the file is owned by
    /// the upload subsystem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_image_path: Option<PathBuf>,
}

impl CertificateRecord {
    /// Check every field and report all problems at once
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if let Some(message) = serial_problem(&self.serial_number) {
            errors.push(FieldError {
                field: "serialNumber",
                message,
            });
        }

        let text_fields = [
            ("participantName", &self.participant_name),
            ("activity", &self.activity),
            ("examinerName", &self.examiner_name),
            ("examinerPosition", &self.examiner_position),
            ("companyCode", &self.company_code),
        ];
        for (field, value) in text_fields {
            if value.trim().is_empty() {
                errors.push(FieldError {
                    field,
                    message: "must not be empty".to_string(),
                });
            }
        }

        if let Some(path) = &self.signature_image_path {
            if path.as_os_str().is_empty() {
                errors.push(FieldError {
                    field: "signatureImagePath",
                    message: "must not be an empty path".to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors })
        }
    }

    /// Issue date as printed on the certificate, e.g. "January 15, 2024"
    pub fn formatted_date(&self) -> String {
        format_issue_date(self.date_issued)
    }
}

pub fn format_issue_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

fn serial_problem(serial: &str) -> Option<String> {
    if serial.trim().is_empty() {
        return Some("must not be empty".to_string());
    }
    if serial.len() > MAX_SERIAL_LEN {
        return Some(format!("must be at most {MAX_SERIAL_LEN} characters"));
    }
    if serial.contains(['/', '\\']) || serial.contains("..") {
        return Some("must not contain path separators or '..'".to_string());
    }
    if serial.chars().any(|c| c.is_control()) {
        return Some("must not contain control characters".to_string());
    }
    None
}

/// Changes to a stored record. Absent fields keep their stored value; the
/// serial number comes from the request path and cannot change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CertificateUpdate {
    pub participant_name: Option<String>,
    pub activity: Option<String>,
    pub examiner_name: Option<String>,
    pub examiner_position: Option<String>,
    pub company_code: Option<String>,
    pub date_issued: Option<NaiveDate>,
    /// A signature uploaded with this update
    pub signature_image_path: Option<PathBuf>,
}

impl CertificateUpdate {
    pub fn has_new_signature(&self) -> bool {
        self.signature_image_path.is_some()
    }

    /// The record with this update applied; not validated
    pub fn apply_to(self, mut record: CertificateRecord) -> CertificateRecord {
        let fields = [
            (self.participant_name, &mut record.participant_name),
            (self.activity, &mut record.activity),
            (self.examiner_name, &mut record.examiner_name),
            (self.examiner_position, &mut record.examiner_position),
            (self.company_code, &mut record.company_code),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
        if let Some(date) = self.date_issued {
            record.date_issued = date;
        }
        if let Some(path) = self.signature_image_path {
            record.signature_image_path = Some(path);
        }
        record
    }
}

/// Case-insensitive substring filters for listing; blank values match all
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateFilter {
    pub activity: Option<String>,
    pub participant_name: Option<String>,
    pub examiner_name: Option<String>,
}

impl CertificateFilter {
    pub fn matches(&self, record: &CertificateRecord) -> bool {
        contains(&record.activity, self.activity.as_deref())
            && contains(&record.participant_name, self.participant_name.as_deref())
            && contains(&record.examiner_name, self.examiner_name.as_deref())
    }
}

fn contains(value: &str, needle: Option<&str>) -> bool {
    match needle {
        Some(needle) if !needle.trim().is_empty() => {
            value.to_lowercase().contains(&needle.to_lowercase())
        }
        _ => true,
    }
}

/// Record as held by the metadata store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCertificate {
    #[serde(flatten)]
    pub record: CertificateRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
