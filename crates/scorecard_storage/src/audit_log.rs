#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use scorecard_kernel_contracts::audit::{AuditEntry, AUDIT_COLUMNS};
use scorecard_kernel_contracts::common::TIMESTAMP_FORMAT;
use scorecard_kernel_contracts::table::{CellValue, Table};
use tracing::{info, warn};

use crate::tabular::{read_table_file, write_table_file, XlsxCodec};
use crate::StorageError;

/// Append-only action log. Rows are never updated or deleted.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_raw(&self) -> Result<Table, StorageError> {
        Ok(read_table_file(&self.path, &XlsxCodec::default())?
            .unwrap_or_else(|| Table::with_columns(&AUDIT_COLUMNS)))
    }

    pub fn append(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        let mut table = self.load_raw()?;
        let mut row = Table::with_columns(&AUDIT_COLUMNS);
        row.push_row(vec![
            CellValue::text(entry.timestamp.format(TIMESTAMP_FORMAT).to_string()),
            CellValue::text(entry.action.clone()),
            CellValue::text(entry.attachment_id.clone()),
            CellValue::text(entry.filename.clone()),
            CellValue::text(entry.performed_by.clone()),
        ])?;
        table.append(&row);
        write_table_file(&self.path, &table, &XlsxCodec::default())?;
        info!(
            action = %entry.action,
            attachment_id = %entry.attachment_id,
            performed_by = %entry.performed_by,
            "audit entry appended"
        );
        Ok(())
    }

    /// Entries in write order. Rows whose timestamp cannot be read are skipped.
    pub fn entries(&self) -> Result<Vec<AuditEntry>, StorageError> {
        let table = self.load_raw()?;
        let idx: Vec<Option<usize>> = AUDIT_COLUMNS
            .iter()
            .map(|c| table.column_index_ci(c))
            .collect();
        let mut out = Vec::with_capacity(table.row_count());
        for (row_no, row) in table.rows().iter().enumerate() {
            let text = |i: usize| -> String {
                idx[i]
                    .map(|c| row[c].to_text().trim().to_string())
                    .unwrap_or_default()
            };
            let Ok(timestamp) = NaiveDateTime::parse_from_str(&text(0), TIMESTAMP_FORMAT) else {
                warn!(row = row_no, "audit row with unreadable timestamp skipped");
                continue;
            };
            out.push(AuditEntry {
                timestamp,
                action: text(1),
                attachment_id: text(2),
                filename: text(3),
                performed_by: text(4),
            });
        }
        Ok(out)
    }
}
