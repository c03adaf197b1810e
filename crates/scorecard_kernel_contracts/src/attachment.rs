#![forbid(unsafe_code)]

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::common::{validate_len, validate_text};
use crate::period::ReportingPeriod;
use crate::{ContractViolation, SchemaVersion, Validate};

pub const HISTORY_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Persisted history columns, in on-disk order.
pub const HISTORY_COLUMNS: [&str; 13] = [
    "id",
    "filename",
    "saved_path",
    "uploader",
    "upload_dt",
    "reporting_month",
    "rows_count",
    "source_url",
    "status",
    "message",
    "active",
    "superseded_by",
    "validation_status",
];

pub const UPLOAD_STATUS_SUCCESS: &str = "success";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttachmentId(String);

impl AttachmentId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = Self(id.into().trim().to_string());
        id.validate()?;
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for AttachmentId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("attachment_id", &self.0, 64)
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationStatus {
    Valid,
    Invalid,
}

impl ValidationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Invalid => "Invalid",
        }
    }

    /// Anything other than `Invalid` (including blanks from older ledgers) reads as `Valid`.
    pub fn parse_lenient(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("invalid") {
            Self::Invalid
        } else {
            Self::Valid
        }
    }
}

/// One uploaded file's ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub schema_version: SchemaVersion,
    pub id: AttachmentId,
    pub filename: String,
    pub saved_path: PathBuf,
    pub uploader: String,
    pub uploaded_at: NaiveDateTime,
    pub reporting_period: ReportingPeriod,
    pub rows_count: u64,
    pub source_url: String,
    pub status: String,
    pub message: String,
    pub active: bool,
    pub superseded_by: Option<AttachmentId>,
    pub validation_status: ValidationStatus,
}

impl AttachmentRecord {
    /// Fresh upload: always `Valid` and active for its period.
    #[allow(clippy::too_many_arguments)]
    pub fn v1_uploaded(
        id: AttachmentId,
        filename: String,
        saved_path: PathBuf,
        uploader: String,
        uploaded_at: NaiveDateTime,
        reporting_period: ReportingPeriod,
        rows_count: u64,
        source_url: Option<String>,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: HISTORY_CONTRACT_VERSION,
            id,
            filename,
            saved_path,
            uploader,
            uploaded_at,
            reporting_period,
            rows_count,
            source_url: source_url.unwrap_or_default(),
            status: UPLOAD_STATUS_SUCCESS.to_string(),
            message: String::new(),
            active: true,
            superseded_by: None,
            validation_status: ValidationStatus::Valid,
        };
        r.validate()?;
        Ok(r)
    }

    pub fn is_invalid(&self) -> bool {
        self.validation_status == ValidationStatus::Invalid
    }
}

impl Validate for AttachmentRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != HISTORY_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "attachment_record.schema_version",
                reason: "must match HISTORY_CONTRACT_VERSION",
            });
        }
        self.id.validate()?;
        self.reporting_period.validate()?;
        validate_text("attachment_record.filename", &self.filename, 255)?;
        validate_text("attachment_record.uploader", &self.uploader, 96)?;
        validate_len("attachment_record.source_url", &self.source_url, 2048)?;
        validate_len("attachment_record.message", &self.message, 1024)?;
        if self.saved_path.as_os_str().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "attachment_record.saved_path",
                reason: "must not be empty",
            });
        }
        if self.superseded_by.as_ref() == Some(&self.id) {
            return Err(ContractViolation::InvalidValue {
                field: "attachment_record.superseded_by",
                reason: "must not reference itself",
            });
        }
        if self.is_invalid() && self.active {
            return Err(ContractViolation::InvalidValue {
                field: "attachment_record.active",
                reason: "invalid attachments must be inactive",
            });
        }
        Ok(())
    }
}
