#![forbid(unsafe_code)]

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::attachment::AttachmentId;
use crate::common::validate_text;
use crate::{ContractViolation, Validate};

pub const AUDIT_COLUMNS: [&str; 5] = [
    "timestamp",
    "action",
    "attachment_id",
    "filename",
    "performed_by",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    Upload,
    InvalidationCleanup,
    RestoreValid,
    RestoreValidActive,
    AdminSaveEdit,
}

impl AuditAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Upload => "Upload",
            Self::InvalidationCleanup => "Invalidation & Cleanup",
            Self::RestoreValid => "Restore Valid",
            Self::RestoreValidActive => "Restore Valid (active)",
            Self::AdminSaveEdit => "Admin Save Edit",
        }
    }

    pub fn restore(make_active: bool) -> Self {
        if make_active {
            Self::RestoreValidActive
        } else {
            Self::RestoreValid
        }
    }
}

/// Append-only audit row. `action` is kept as text so rows written by older
/// tools with other labels survive a read-modify-write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: NaiveDateTime,
    pub action: String,
    pub attachment_id: String,
    pub filename: String,
    pub performed_by: String,
}

impl AuditEntry {
    pub fn v1(
        timestamp: NaiveDateTime,
        action: AuditAction,
        attachment_id: &AttachmentId,
        filename: String,
        performed_by: String,
    ) -> Result<Self, ContractViolation> {
        let e = Self {
            timestamp,
            action: action.label().to_string(),
            attachment_id: attachment_id.as_str().to_string(),
            filename,
            performed_by,
        };
        e.validate()?;
        Ok(e)
    }
}

impl Validate for AuditEntry {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("audit_entry.action", &self.action, 64)?;
        validate_text("audit_entry.attachment_id", &self.attachment_id, 64)?;
        validate_text("audit_entry.performed_by", &self.performed_by, 96)?;
        Ok(())
    }
}
