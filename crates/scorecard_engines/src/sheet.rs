#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use scorecard_kernel_contracts::table::{CellValue, Table};
use unicode_normalization::UnicodeNormalization;

use crate::period::{datetime_to_cell_text, excel_serial_to_datetime};

pub const REQUIRED_COLUMNS: [&str; 4] = ["Domain ID", "Function", "Function Lead", "Team Lead"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSheetConfig {
    pub sheet_name: &'static str,
    /// Rows inspected when looking for the header row.
    pub header_scan_rows: usize,
    pub required_columns: &'static [&'static str],
}

impl UploadSheetConfig {
    pub fn mvp_v1() -> Self {
        Self {
            sheet_name: "Data",
            header_scan_rows: 10,
            required_columns: &REQUIRED_COLUMNS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetParseError {
    UnreadableWorkbook(String),
    MissingSheet(String),
}

impl fmt::Display for SheetParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnreadableWorkbook(reason) => write!(f, "workbook could not be read: {reason}"),
            Self::MissingSheet(name) => write!(f, "workbook has no sheet named '{name}'"),
        }
    }
}

impl std::error::Error for SheetParseError {}

/// Reads the upload sheet of a workbook into a [`Table`], locating the header row
/// among the first rows and normalizing header names.
#[derive(Debug, Clone)]
pub struct UploadSheetParser {
    config: UploadSheetConfig,
}

impl Default for UploadSheetParser {
    fn default() -> Self {
        Self::new(UploadSheetConfig::mvp_v1())
    }
}

impl UploadSheetParser {
    pub fn new(config: UploadSheetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UploadSheetConfig {
        &self.config
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<Table, SheetParseError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| SheetParseError::UnreadableWorkbook(e.to_string()))?;
        let name = self.config.sheet_name;
        if !workbook.sheet_names().iter().any(|s| s == name) {
            return Err(SheetParseError::MissingSheet(name.to_string()));
        }
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| SheetParseError::UnreadableWorkbook(e.to_string()))?;
        let grid: Vec<Vec<CellValue>> = range
            .rows()
            .map(|row| row.iter().map(cell_from_data).collect())
            .collect();
        Ok(self.grid_to_table(grid))
    }

    /// Index of the first scanned row containing every required column, else 0.
    pub fn detect_header_row(&self, grid: &[Vec<CellValue>]) -> usize {
        grid.iter()
            .take(self.config.header_scan_rows)
            .position(|row| {
                let names: Vec<String> = row.iter().map(header_text).collect();
                self.config
                    .required_columns
                    .iter()
                    .all(|req| names.iter().any(|n| n == req))
            })
            .unwrap_or(0)
    }

    pub fn grid_to_table(&self, grid: Vec<Vec<CellValue>>) -> Table {
        if grid.is_empty() {
            return Table::default();
        }
        let header_idx = self.detect_header_row(&grid);
        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        let header_row = &grid[header_idx];
        let columns = dedupe_headers(
            (0..width)
                .map(|i| {
                    let name = header_row.get(i).map(header_text).unwrap_or_default();
                    if name.is_empty() {
                        format!("Unnamed: {i}")
                    } else {
                        name
                    }
                })
                .collect(),
        );

        let mut table = Table::new(columns);
        for mut row in grid.into_iter().skip(header_idx + 1) {
            if row.iter().all(CellValue::is_empty) {
                continue;
            }
            row.resize(width, CellValue::Empty);
            // Width is the widest row, so every padded row fits.
            let _ = table.push_row(row);
        }
        table
    }

    /// Required columns absent from `table`, compared trimmed and case-insensitively.
    pub fn missing_columns(&self, table: &Table) -> Vec<String> {
        self.config
            .required_columns
            .iter()
            .filter(|req| table.column_index_ci(req).is_none())
            .map(|req| (*req).to_string())
            .collect()
    }
}

fn header_text(cell: &CellValue) -> String {
    cell.to_text().trim().nfc().collect()
}

fn dedupe_headers(names: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let count = seen.entry(name.clone()).or_insert(0);
        if *count == 0 {
            out.push(name);
        } else {
            out.push(format!("{name}.{count}"));
        }
        *count += 1;
    }
    out
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(v) => CellValue::Number(*v),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match excel_serial_to_datetime(dt.as_f64()) {
            Some(ts) => CellValue::Text(datetime_to_cell_text(ts)),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}
