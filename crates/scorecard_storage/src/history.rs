#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use scorecard_kernel_contracts::attachment::{
    AttachmentId, AttachmentRecord, ValidationStatus, HISTORY_COLUMNS, HISTORY_CONTRACT_VERSION,
};
use scorecard_kernel_contracts::common::TIMESTAMP_FORMAT;
use scorecard_kernel_contracts::period::ReportingPeriod;
use scorecard_kernel_contracts::table::{CellValue, Table};
use scorecard_kernel_contracts::Validate;
use tracing::{info, warn};

use crate::tabular::{read_table_file, remove_file_if_exists, write_table_file, XlsxCodec};
use crate::StorageError;

const TABLE: &str = "history";

/// In-memory history ledger. Owns the rule that each reporting period has at
/// most one active attachment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryTable {
    records: Vec<AttachmentRecord>,
}

impl HistoryTable {
    pub fn from_records(records: Vec<AttachmentRecord>) -> Result<Self, StorageError> {
        let mut t = Self::default();
        for r in records {
            t.append(r)?;
        }
        Ok(t)
    }

    pub fn records(&self) -> &[AttachmentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &AttachmentId) -> Option<&AttachmentRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    fn get_mut(&mut self, id: &AttachmentId) -> Result<&mut AttachmentRecord, StorageError> {
        self.records
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| StorageError::NotFound {
                table: TABLE,
                key: id.to_string(),
            })
    }

    pub fn active_for_period(&self, period: ReportingPeriod) -> Option<&AttachmentRecord> {
        self.records
            .iter()
            .find(|r| r.active && r.reporting_period == period)
    }

    /// Most recently uploaded active record; later rows win ties.
    pub fn latest_active(&self) -> Option<&AttachmentRecord> {
        self.records
            .iter()
            .filter(|r| r.active)
            .fold(None, |best: Option<&AttachmentRecord>, r| match best {
                Some(b) if b.uploaded_at > r.uploaded_at => Some(b),
                _ => Some(r),
            })
    }

    /// Whether a record other than `id` that is not invalid still points at `path`.
    pub fn backing_file_shared(&self, id: &AttachmentId, path: &Path) -> bool {
        self.records
            .iter()
            .any(|r| &r.id != id && !r.is_invalid() && r.saved_path == path)
    }

    pub fn active_ids(&self) -> Vec<&AttachmentId> {
        self.records
            .iter()
            .filter(|r| r.active)
            .map(|r| &r.id)
            .collect()
    }

    /// Deactivates whatever is active for `period` and points it at `new_id`.
    /// Returns the displaced records as they are after the change.
    pub fn supersede(
        &mut self,
        period: ReportingPeriod,
        new_id: &AttachmentId,
    ) -> Vec<AttachmentRecord> {
        let mut displaced = Vec::new();
        for r in self
            .records
            .iter_mut()
            .filter(|r| r.active && r.reporting_period == period && &r.id != new_id)
        {
            r.active = false;
            r.superseded_by = Some(new_id.clone());
            displaced.push(r.clone());
        }
        displaced
    }

    pub fn append(&mut self, record: AttachmentRecord) -> Result<(), StorageError> {
        record.validate()?;
        if self.get(&record.id).is_some() {
            return Err(StorageError::DuplicateKey {
                table: TABLE,
                key: record.id.to_string(),
            });
        }
        if record.active {
            if let Some(current) = self.active_for_period(record.reporting_period) {
                return Err(StorageError::ActivePeriodConflict {
                    period: record.reporting_period.to_string(),
                    active_id: current.id.to_string(),
                });
            }
        }
        self.records.push(record);
        Ok(())
    }

    pub fn invalidate(&mut self, id: &AttachmentId) -> Result<AttachmentRecord, StorageError> {
        let r = self.get_mut(id)?;
        r.validation_status = ValidationStatus::Invalid;
        r.active = false;
        Ok(r.clone())
    }

    /// Marks `id` valid again. With `make_active` the record currently active
    /// for the same period is displaced first; its id is returned.
    pub fn restore(
        &mut self,
        id: &AttachmentId,
        make_active: bool,
    ) -> Result<Vec<AttachmentId>, StorageError> {
        let period = self.get_mut(id)?.reporting_period;
        let displaced = if make_active {
            self.supersede(period, id)
                .into_iter()
                .map(|r| r.id)
                .collect()
        } else {
            Vec::new()
        };
        let r = self.get_mut(id)?;
        r.validation_status = ValidationStatus::Valid;
        if make_active {
            r.active = true;
            r.superseded_by = None;
        }
        Ok(displaced)
    }

    pub fn to_table(&self) -> Table {
        let mut t = Table::with_columns(&HISTORY_COLUMNS);
        for r in &self.records {
            let row = vec![
                CellValue::text(r.id.as_str()),
                CellValue::text(r.filename.clone()),
                CellValue::text(r.saved_path.to_string_lossy()),
                CellValue::text(r.uploader.clone()),
                CellValue::text(r.uploaded_at.format(TIMESTAMP_FORMAT).to_string()),
                CellValue::text(r.reporting_period.to_string()),
                CellValue::Number(r.rows_count as f64),
                CellValue::text(r.source_url.clone()),
                CellValue::text(r.status.clone()),
                CellValue::text(r.message.clone()),
                CellValue::Bool(r.active),
                r.superseded_by
                    .as_ref()
                    .map(|s| CellValue::text(s.as_str()))
                    .unwrap_or_default(),
                CellValue::text(r.validation_status.as_str()),
            ];
            // Row width is HISTORY_COLUMNS by construction.
            let _ = t.push_row(row);
        }
        t
    }

    /// Reads a persisted history table. Columns are matched by name so older
    /// files without `validation_status` or `superseded_by` still load. When a
    /// period has several active rows only the newest upload stays active.
    pub fn from_table(table: &Table) -> Result<Self, StorageError> {
        let col = |name: &str| table.column_index_ci(name);
        let idx: Vec<Option<usize>> = HISTORY_COLUMNS.iter().map(|c| col(c)).collect();
        let mut records = Vec::with_capacity(table.row_count());
        for (row_no, row) in table.rows().iter().enumerate() {
            let text = |i: usize| -> String {
                idx[i]
                    .map(|c| row[c].to_text().trim().to_string())
                    .unwrap_or_default()
            };
            if text(0).is_empty() {
                warn!(row = row_no, "history row without id skipped");
                continue;
            }
            let malformed = |reason: String| StorageError::MalformedRow {
                table: TABLE,
                row: row_no,
                reason,
            };
            let uploaded_at = parse_timestamp(&text(4))
                .ok_or_else(|| malformed(format!("upload_dt '{}'", text(4))))?;
            let reporting_period: ReportingPeriod = text(5)
                .parse()
                .map_err(|e| malformed(format!("reporting_month: {e}")))?;
            let rows_count = idx[6]
                .and_then(|c| match &row[c] {
                    CellValue::Number(v) if *v >= 0.0 => Some(*v as u64),
                    other => other.to_text().trim().parse::<u64>().ok(),
                })
                .unwrap_or(0);
            let superseded_by = match text(11) {
                s if s.is_empty() => None,
                s => Some(AttachmentId::new(s)?),
            };
            let record = AttachmentRecord {
                schema_version: HISTORY_CONTRACT_VERSION,
                id: AttachmentId::new(text(0))?,
                filename: text(1),
                saved_path: PathBuf::from(text(2)),
                uploader: text(3),
                uploaded_at,
                reporting_period,
                rows_count,
                source_url: text(7),
                status: text(8),
                message: text(9),
                active: idx[10].map(|c| coerce_active(&row[c])).unwrap_or(false),
                superseded_by,
                validation_status: ValidationStatus::parse_lenient(&text(12)),
            };
            records.push(record);
        }
        demote_duplicate_actives(&mut records);
        let mut out = Self::default();
        for record in records {
            out.append(record)?;
        }
        Ok(out)
    }
}

/// Keeps the newest active record per period (ties go to the later row) and
/// deactivates the rest. Invalid records are never active.
fn demote_duplicate_actives(records: &mut [AttachmentRecord]) {
    for r in records.iter_mut().filter(|r| r.active && r.is_invalid()) {
        warn!(attachment_id = %r.id, "invalid history row was marked active");
        r.active = false;
    }
    let mut keep: HashMap<ReportingPeriod, usize> = HashMap::new();
    for (i, r) in records.iter().enumerate().filter(|(_, r)| r.active) {
        let newer = keep
            .get(&r.reporting_period)
            .map_or(true, |&k| r.uploaded_at >= records[k].uploaded_at);
        if newer {
            keep.insert(r.reporting_period, i);
        }
    }
    for (i, r) in records.iter_mut().enumerate() {
        if r.active && keep.get(&r.reporting_period) != Some(&i) {
            warn!(
                attachment_id = %r.id,
                period = %r.reporting_period,
                "duplicate active history row deactivated on load"
            );
            r.active = false;
        }
    }
}

/// Tolerant truthiness for the `active` column (`true/1/yes/y/t`).
pub fn coerce_active(cell: &CellValue) -> bool {
    match cell {
        CellValue::Bool(b) => *b,
        CellValue::Number(v) => *v == 1.0,
        CellValue::Text(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "y" | "t"
        ),
        CellValue::Empty => false,
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// File-backed history ledger. Every mutation is a full read-modify-write.
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    path: PathBuf,
}

impl HistoryLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file reads as an empty ledger.
    pub fn load(&self) -> Result<HistoryTable, StorageError> {
        match read_table_file(&self.path, &XlsxCodec::default())? {
            Some(table) => HistoryTable::from_table(&table),
            None => Ok(HistoryTable::default()),
        }
    }

    pub fn save(&self, history: &HistoryTable) -> Result<(), StorageError> {
        write_table_file(&self.path, &history.to_table(), &XlsxCodec::default())
    }

    /// Supersedes the period's active record, deletes its backing file
    /// (best effort), then appends `record` and persists once.
    pub fn supersede_and_append(
        &self,
        record: AttachmentRecord,
    ) -> Result<Vec<AttachmentRecord>, StorageError> {
        let mut history = self.load()?;
        let displaced = history.supersede(record.reporting_period, &record.id);
        for old in &displaced {
            info!(
                attachment_id = %old.id,
                superseded_by = %record.id,
                period = %record.reporting_period,
                "attachment superseded"
            );
            // Same name and period resolve to the same path; that file now holds the new upload.
            if old.saved_path != record.saved_path {
                delete_backing_file(&old.saved_path);
            }
        }
        history.append(record)?;
        self.save(&history)?;
        Ok(displaced)
    }

    pub fn invalidate(&self, id: &AttachmentId) -> Result<AttachmentRecord, StorageError> {
        let mut history = self.load()?;
        let record = history.invalidate(id)?;
        self.save(&history)?;
        Ok(record)
    }

    pub fn restore(
        &self,
        id: &AttachmentId,
        make_active: bool,
    ) -> Result<Vec<AttachmentId>, StorageError> {
        let mut history = self.load()?;
        let displaced = history.restore(id, make_active)?;
        self.save(&history)?;
        Ok(displaced)
    }
}

/// Removes an attachment's original file; failures are logged, never returned.
pub fn delete_backing_file(path: &Path) {
    match remove_file_if_exists(path) {
        Ok(true) => info!(path = %path.display(), "backing file deleted"),
        Ok(false) => {}
        Err(e) => warn!(path = %path.display(), error = %e, "backing file delete failed"),
    }
}
