#![forbid(unsafe_code)]

use std::fmt;
use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::Workbook;
use scorecard_kernel_contracts::table::{format_number, CellValue, Table};

use crate::error::{CodecError, StorageError};

/// Legacy spreadsheet sheet limits (header row included in the row count).
pub const XLSX_MAX_ROWS: usize = 1_048_576;
pub const XLSX_MAX_COLS: usize = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableFormat {
    /// Size-constrained spreadsheet workbook.
    Primary,
    /// Unconstrained comma-separated text.
    Flat,
}

impl TableFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Primary => "xlsx",
            Self::Flat => "csv",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Primary => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Flat => "text/csv",
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLimits {
    pub max_rows: usize,
    pub max_cols: usize,
}

impl Default for TableLimits {
    fn default() -> Self {
        Self {
            max_rows: XLSX_MAX_ROWS,
            max_cols: XLSX_MAX_COLS,
        }
    }
}

impl TableLimits {
    /// True when the data rows plus the header row fit the primary format.
    pub fn fits(&self, table: &Table) -> bool {
        table.row_count() + 1 <= self.max_rows && table.column_count() <= self.max_cols
    }

    pub fn format_for(&self, table: &Table) -> TableFormat {
        if self.fits(table) {
            TableFormat::Primary
        } else {
            TableFormat::Flat
        }
    }
}

/// Byte-level encoding of a header-first table.
pub trait TableCodec {
    fn format(&self) -> TableFormat;
    fn encode(&self, table: &Table) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Table, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxCodec {
    pub limits: TableLimits,
}

impl TableCodec for XlsxCodec {
    fn format(&self) -> TableFormat {
        TableFormat::Primary
    }

    fn encode(&self, table: &Table) -> Result<Vec<u8>, CodecError> {
        if !self.limits.fits(table) {
            return Err(CodecError::ExceedsLimits(TableFormat::Primary));
        }
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (c, name) in table.columns().iter().enumerate() {
            sheet.write_string(0, c as u16, name.as_str())?;
        }
        for (r, row) in table.rows().iter().enumerate() {
            let r = (r + 1) as u32;
            for (c, cell) in row.iter().enumerate() {
                let c = c as u16;
                match cell {
                    CellValue::Empty => {}
                    CellValue::Text(s) => {
                        sheet.write_string(r, c, s.as_str())?;
                    }
                    CellValue::Number(v) if v.is_finite() => {
                        sheet.write_number(r, c, *v)?;
                    }
                    CellValue::Number(v) => {
                        sheet.write_string(r, c, v.to_string())?;
                    }
                    CellValue::Bool(b) => {
                        sheet.write_boolean(r, c, *b)?;
                    }
                }
            }
        }
        Ok(workbook.save_to_buffer()?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Table, CodecError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| CodecError::WorkbookRead(e.to_string()))?;
        let range = match workbook.worksheet_range_at(0) {
            Some(range) => range.map_err(|e| CodecError::WorkbookRead(e.to_string()))?,
            None => return Ok(Table::default()),
        };
        let grid: Vec<Vec<CellValue>> = range
            .rows()
            .map(|row| row.iter().map(cell_from_data).collect())
            .collect();
        Ok(header_first(grid))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvCodec;

impl TableCodec for CsvCodec {
    fn format(&self) -> TableFormat {
        TableFormat::Flat
    }

    fn encode(&self, table: &Table) -> Result<Vec<u8>, CodecError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(table.columns())?;
        for row in table.rows() {
            writer.write_record(row.iter().map(CellValue::to_text))?;
        }
        writer
            .into_inner()
            .map_err(|e| CodecError::Csv(csv::Error::from(e.into_error())))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Table, CodecError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);
        let mut grid: Vec<Vec<CellValue>> = Vec::new();
        for record in reader.records() {
            let record = record?;
            grid.push(record.iter().map(infer_flat_cell).collect());
        }
        if let Some(header) = grid.first_mut() {
            // Header names are always text, even when they look numeric.
            for cell in header.iter_mut() {
                *cell = CellValue::Text(cell.to_text());
            }
        }
        Ok(header_first(grid))
    }
}

pub fn codec_for(format: TableFormat, limits: TableLimits) -> Box<dyn TableCodec> {
    match format {
        TableFormat::Primary => Box::new(XlsxCodec { limits }),
        TableFormat::Flat => Box::new(CsvCodec),
    }
}

/// Flat text carries no types: numbers are recovered only when they print back
/// identically, so identifiers such as `007` stay text.
fn infer_flat_cell(field: &str) -> CellValue {
    if field.is_empty() {
        return CellValue::Empty;
    }
    match field {
        "true" => return CellValue::Bool(true),
        "false" => return CellValue::Bool(false),
        _ => {}
    }
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() && format_number(v) == field => CellValue::Number(v),
        _ => CellValue::text(field),
    }
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(v) => CellValue::Number(*v),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => CellValue::Text(
                ts.format(scorecard_kernel_contracts::common::TIMESTAMP_FORMAT)
                    .to_string(),
            ),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

/// First grid row names the columns; remaining rows are padded to the widest row.
fn header_first(grid: Vec<Vec<CellValue>>) -> Table {
    let mut rows = grid.into_iter();
    let Some(header) = rows.next() else {
        return Table::default();
    };
    let rest: Vec<Vec<CellValue>> = rows.collect();
    let width = rest.iter().map(Vec::len).max().unwrap_or(0).max(header.len());
    let columns: Vec<String> = (0..width)
        .map(|i| match header.get(i).map(CellValue::to_text) {
            Some(name) if !name.trim().is_empty() => name,
            _ => format!("Unnamed: {i}"),
        })
        .collect();
    let mut table = Table::new(columns);
    for mut row in rest {
        row.resize(width, CellValue::Empty);
        let _ = table.push_row(row);
    }
    table
}

/// Reads and decodes `path`; `Ok(None)` when the file does not exist.
pub fn read_table_file(path: &Path, codec: &dyn TableCodec) -> Result<Option<Table>, StorageError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    codec
        .decode(&bytes)
        .map(Some)
        .map_err(|e| StorageError::codec(path, e))
}

pub fn write_table_file(
    path: &Path,
    table: &Table,
    codec: &dyn TableCodec,
) -> Result<(), StorageError> {
    let bytes = codec
        .encode(table)
        .map_err(|e| StorageError::codec(path, e))?;
    atomic_write(path, &bytes)
}

/// Writes to a sibling temp file, then renames over `path`.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, data).map_err(|e| StorageError::io(path, e))?;
    fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))
}

/// Removes `path`, treating an already-missing file as success.
pub fn remove_file_if_exists(path: &Path) -> Result<bool, StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

/// Export-time cleanup: drops `Unnamed*` columns and columns with no non-blank value.
pub fn drop_placeholder_columns(table: &Table) -> Table {
    let mut out = table.clone();
    let drop: Vec<String> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, name)| {
            name.to_lowercase().starts_with("unnamed")
                || table.rows().iter().all(|row| is_blank_export_cell(&row[*idx]))
        })
        .map(|(_, name)| name.clone())
        .collect();
    out.drop_columns(&drop);
    out
}

fn is_blank_export_cell(cell: &CellValue) -> bool {
    match cell {
        CellValue::Text(s) => matches!(s.trim(), "" | "None" | "nan" | "NaT"),
        other => other.is_empty(),
    }
}

/// Downloadable encoding of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub format: TableFormat,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Encodes `table` in the primary format when it fits `limits`, otherwise flat.
pub fn encode_export(
    table: &Table,
    limits: TableLimits,
    base_name: &str,
    hide_placeholder_columns: bool,
) -> Result<ExportArtifact, StorageError> {
    let cleaned;
    let table = if hide_placeholder_columns {
        cleaned = drop_placeholder_columns(table);
        &cleaned
    } else {
        table
    };
    let format = limits.format_for(table);
    let bytes = codec_for(format, limits)
        .encode(table)
        .map_err(StorageError::Export)?;
    Ok(ExportArtifact {
        format,
        file_name: format!("{base_name}.{}", format.extension()),
        bytes,
    })
}
