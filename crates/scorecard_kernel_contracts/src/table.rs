#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ContractViolation;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Blank text counts as empty, matching how spreadsheet readers surface blank cells.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) | Self::Bool(_) => false,
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(v) => format_number(*v),
            Self::Bool(b) => b.to_string(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Integral values render without a fractional part (`101`, not `101.0`).
pub fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Column-ordered row set. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_columns(columns: &[&str]) -> Self {
        Self::new(columns.iter().map(|c| (*c).to_string()).collect())
    }

    pub fn from_rows(
        columns: Vec<String>,
        rows: Vec<Vec<CellValue>>,
    ) -> Result<Self, ContractViolation> {
        let mut t = Self::new(columns);
        for row in rows {
            t.push_row(row)?;
        }
        Ok(t)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Trimmed, case-insensitive lookup.
    pub fn column_index_ci(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.columns
            .iter()
            .position(|c| c.trim().to_lowercase() == wanted)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&CellValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    pub fn column_values(&self, column: &str) -> Option<Vec<&CellValue>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) -> Result<(), ContractViolation> {
        if row.len() != self.columns.len() {
            return Err(ContractViolation::InvalidValue {
                field: "table.row",
                reason: "cell count must match column count",
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Returns the index of `name`, appending it (filled with `Empty`) when absent.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(CellValue::Empty);
        }
        self.columns.len() - 1
    }

    pub fn fill_column(&mut self, name: &str, value: CellValue) {
        let idx = self.ensure_column(name);
        for row in &mut self.rows {
            row[idx] = value.clone();
        }
    }

    pub fn set_column_values(
        &mut self,
        name: &str,
        values: Vec<CellValue>,
    ) -> Result<(), ContractViolation> {
        if values.len() != self.rows.len() {
            return Err(ContractViolation::InvalidValue {
                field: "table.column_values",
                reason: "value count must match row count",
            });
        }
        let idx = self.ensure_column(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
        Ok(())
    }

    pub fn map_column<F>(&mut self, idx: usize, mut f: F)
    where
        F: FnMut(&CellValue) -> CellValue,
    {
        if idx >= self.columns.len() {
            return;
        }
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[CellValue]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    /// Rows whose `column` cell renders as `value`; all columns are kept.
    pub fn filter_eq(&self, column: &str, value: &str) -> Table {
        let mut out = Table::new(self.columns.clone());
        if let Some(idx) = self.column_index(column) {
            out.rows = self
                .rows
                .iter()
                .filter(|r| r[idx].to_text() == value)
                .cloned()
                .collect();
        }
        out
    }

    pub fn drop_columns(&mut self, names: &[String]) {
        let keep: Vec<bool> = self.columns.iter().map(|c| !names.contains(c)).collect();
        let mut i = 0;
        self.columns.retain(|_| {
            let k = keep[i];
            i += 1;
            k
        });
        for row in &mut self.rows {
            let mut j = 0;
            row.retain(|_| {
                let k = keep[j];
                j += 1;
                k
            });
        }
    }

    /// Appends `other` by column name; columns unknown to `self` are added at the end.
    pub fn append(&mut self, other: &Table) {
        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|c| self.ensure_column(c))
            .collect();
        let width = self.columns.len();
        for src in &other.rows {
            let mut row = vec![CellValue::Empty; width];
            for (cell, &dst) in src.iter().zip(&mapping) {
                row[dst] = cell.clone();
            }
            self.rows.push(row);
        }
    }
}
