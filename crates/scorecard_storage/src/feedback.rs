#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use scorecard_kernel_contracts::common::TIMESTAMP_FORMAT;
use scorecard_kernel_contracts::feedback::{FeedbackEntry, FEEDBACK_COLUMNS};
use scorecard_kernel_contracts::table::{CellValue, Table};
use tracing::{info, warn};

use crate::tabular::{read_table_file, write_table_file, XlsxCodec};
use crate::StorageError;

const DOMAIN_COL: usize = 0;
const MONTH_COL: usize = 2;

/// Monthly feedback keyed by (Domain ID, Month).
#[derive(Debug, Clone)]
pub struct FeedbackStore {
    path: PathBuf,
}

impl FeedbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unreadable or missing files read as an empty table.
    pub fn load(&self) -> Table {
        let mut table = match read_table_file(&self.path, &XlsxCodec::default()) {
            Ok(Some(table)) => table,
            Ok(None) => Table::with_columns(&FEEDBACK_COLUMNS),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "feedback unreadable; using empty table");
                Table::with_columns(&FEEDBACK_COLUMNS)
            }
        };
        for c in FEEDBACK_COLUMNS {
            table.ensure_column(c);
        }
        table
    }

    /// Removes every row for the entry's key, then appends the entry.
    pub fn upsert(&self, entry: &FeedbackEntry) -> Result<(), StorageError> {
        let mut table = self.load();
        let domain = table.column_index(FEEDBACK_COLUMNS[DOMAIN_COL]);
        let month = table.column_index(FEEDBACK_COLUMNS[MONTH_COL]);
        if let (Some(d), Some(m)) = (domain, month) {
            table.retain_rows(|row| {
                !(row[d].to_text().trim() == entry.domain_id.trim()
                    && row[m].to_text().trim() == entry.month.trim())
            });
        }
        let mut row = Table::with_columns(&FEEDBACK_COLUMNS);
        row.push_row(vec![
            CellValue::text(entry.domain_id.clone()),
            CellValue::text(entry.name.clone()),
            CellValue::text(entry.month.clone()),
            CellValue::text(entry.team_lead.clone()),
            CellValue::text(entry.feedback.clone()),
            CellValue::text(entry.timestamp.format(TIMESTAMP_FORMAT).to_string()),
            CellValue::text(entry.entered_by.clone()),
        ])?;
        table.append(&row);
        write_table_file(&self.path, &table, &XlsxCodec::default())?;
        info!(domain_id = %entry.domain_id, month = %entry.month, "feedback upserted");
        Ok(())
    }

    /// All readable entries in file order.
    pub fn entries(&self) -> Vec<FeedbackEntry> {
        let table = self.load();
        let idx: Vec<Option<usize>> = FEEDBACK_COLUMNS
            .iter()
            .map(|c| table.column_index(c))
            .collect();
        table
            .rows()
            .iter()
            .filter_map(|row| {
                let text = |i: usize| -> String {
                    idx[i]
                        .map(|c| row[c].to_text().trim().to_string())
                        .unwrap_or_default()
                };
                let timestamp = NaiveDateTime::parse_from_str(&text(5), TIMESTAMP_FORMAT).ok()?;
                Some(FeedbackEntry {
                    domain_id: text(0),
                    name: text(1),
                    month: text(2),
                    team_lead: text(3),
                    feedback: idx[4].map(|c| row[c].to_text()).unwrap_or_default(),
                    timestamp,
                    entered_by: text(6),
                })
            })
            .collect()
    }

    /// Latest entry for the key; ties on timestamp go to the later row.
    pub fn latest_for(&self, domain_id: &str, month: &str) -> Option<FeedbackEntry> {
        latest_by_key(self.entries(), domain_id, month)
    }
}

pub fn latest_by_key(
    entries: Vec<FeedbackEntry>,
    domain_id: &str,
    month: &str,
) -> Option<FeedbackEntry> {
    entries
        .into_iter()
        .enumerate()
        .filter(|(_, e)| e.matches_key(domain_id, month))
        .max_by(|(ia, a), (ib, b)| a.timestamp.cmp(&b.timestamp).then(ia.cmp(ib)))
        .map(|(_, e)| e)
}
