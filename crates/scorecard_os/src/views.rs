#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use scorecard_engines::period::month_keys;
use scorecard_kernel_contracts::attachment::AttachmentRecord;
use scorecard_kernel_contracts::common::TIMESTAMP_FORMAT;
use scorecard_kernel_contracts::feedback::FeedbackEntry;
use scorecard_kernel_contracts::table::{CellValue, Table};
use scorecard_storage::combined::ATTACHMENT_ID_COLUMN;
use scorecard_storage::tabular::{encode_export, ExportArtifact};

use crate::attachment_store::{AttachmentError, AttachmentVersionStore};
use crate::clock::WallClock;

pub const FEEDBACK_TEXT_COLUMN: &str = "Monthly feedback/feedforward";
pub const FEEDBACK_TIMESTAMP_COLUMN: &str = "Feedback timestamp";
pub const REPORTING_MONTH_COLUMN: &str = "reporting_month";
pub const RANK_COLUMN: &str = "Rank";
const RANK_SOURCE_COLUMN: &str = "Final Score_num";
const DOMAIN_COLUMN: &str = "Domain ID";

/// Rows of the most recent active attachment with feedback merged in.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyView {
    pub record: AttachmentRecord,
    pub rows: Table,
}

impl<C: WallClock> AttachmentVersionStore<C> {
    pub fn latest_monthly_view(&self) -> Result<Option<MonthlyView>, AttachmentError> {
        let Some(record) = self.latest_active()? else {
            return Ok(None);
        };
        let combined = self.combined();
        self.warn_if_recovered(&combined);
        let mut rows = combined
            .table
            .filter_eq(ATTACHMENT_ID_COLUMN, record.id.as_str());
        merge_feedback(&mut rows, &record, &self.feedback_entries());
        add_rank(&mut rows);
        Ok(Some(MonthlyView { record, rows }))
    }

    /// Combined rows owned by active attachments, tagged with their period.
    pub fn active_rows(&self) -> Result<Table, AttachmentError> {
        let history = self.history()?;
        let periods: HashMap<&str, String> = history
            .records()
            .iter()
            .filter(|r| r.active)
            .map(|r| (r.id.as_str(), r.reporting_period.to_string()))
            .collect();
        let combined = self.combined();
        self.warn_if_recovered(&combined);

        let mut out = combined.table.clone();
        let Some(idx) = out.column_index(ATTACHMENT_ID_COLUMN) else {
            return Ok(out);
        };
        out.retain_rows(|row| periods.contains_key(row[idx].to_text().trim()));
        let months = out
            .rows()
            .iter()
            .map(|row| {
                periods
                    .get(row[idx].to_text().trim())
                    .map(|p| CellValue::text(p.clone()))
                    .unwrap_or_default()
            })
            .collect();
        out.set_column_values(REPORTING_MONTH_COLUMN, months)?;
        Ok(out)
    }

    /// Encodes `table` for download under this namespace's export prefix.
    pub fn export_table(
        &self,
        table: &Table,
        base_name: &str,
        hide_placeholder_columns: bool,
    ) -> Result<ExportArtifact, AttachmentError> {
        let name = format!("{}{base_name}", self.layout().export_prefix());
        Ok(encode_export(
            table,
            self.combined_store().limits(),
            &name,
            hide_placeholder_columns,
        )?)
    }
}

fn merge_feedback(rows: &mut Table, record: &AttachmentRecord, entries: &[FeedbackEntry]) {
    let mut latest: HashMap<(String, String), &FeedbackEntry> = HashMap::new();
    for e in entries {
        let key = (e.domain_id.trim().to_string(), e.month.trim().to_string());
        let newer = latest
            .get(&key)
            .map_or(true, |prev| e.timestamp >= prev.timestamp);
        if newer {
            latest.insert(key, e);
        }
    }

    let period = record.reporting_period.to_string();
    let months = match month_keys(rows) {
        Some(keys) if keys.iter().any(|k| !k.is_empty()) => keys,
        _ => vec![period; rows.row_count()],
    };
    let domain_idx = rows.column_index_ci(DOMAIN_COLUMN);

    let mut text = Vec::with_capacity(rows.row_count());
    let mut stamp = Vec::with_capacity(rows.row_count());
    for (row, month) in rows.rows().iter().zip(&months) {
        let hit = domain_idx.and_then(|d| {
            latest
                .get(&(row[d].to_text().trim().to_string(), month.clone()))
                .copied()
        });
        match hit {
            Some(e) => {
                text.push(CellValue::text(e.feedback.clone()));
                stamp.push(CellValue::text(e.timestamp.format(TIMESTAMP_FORMAT).to_string()));
            }
            None => {
                text.push(CellValue::Empty);
                stamp.push(CellValue::Empty);
            }
        }
    }
    // Both vectors have one value per row.
    let _ = rows.set_column_values(FEEDBACK_TEXT_COLUMN, text);
    let _ = rows.set_column_values(FEEDBACK_TIMESTAMP_COLUMN, stamp);
}

/// Dense descending rank over the numeric final score, when no rank is supplied.
fn add_rank(rows: &mut Table) {
    if rows.column_index(RANK_COLUMN).is_some() {
        return;
    }
    let Some(values) = rows.column_values(RANK_SOURCE_COLUMN) else {
        return;
    };
    let scores: Vec<Option<f64>> = values
        .iter()
        .map(|c| c.as_number().filter(|v| v.is_finite()))
        .collect();
    let ranks = dense_rank_desc(&scores);
    let _ = rows.set_column_values(RANK_COLUMN, ranks);
}

fn dense_rank_desc(scores: &[Option<f64>]) -> Vec<CellValue> {
    let mut distinct: Vec<f64> = scores.iter().flatten().copied().collect();
    distinct.sort_by(|a, b| b.total_cmp(a));
    distinct.dedup();
    scores
        .iter()
        .map(|s| match s {
            Some(v) => distinct
                .iter()
                .position(|d| d == v)
                .map(|p| CellValue::Number((p + 1) as f64))
                .unwrap_or_default(),
            None => CellValue::Empty,
        })
        .collect()
}

/// Distinct attachment ids present in a combined table.
pub fn attachment_ids(table: &Table) -> HashSet<String> {
    table
        .column_values(ATTACHMENT_ID_COLUMN)
        .map(|vals| vals.iter().map(|c| c.to_text().trim().to_string()).collect())
        .unwrap_or_default()
}
