#![forbid(unsafe_code)]

use std::path::PathBuf;

use scorecard_kernel_contracts::ContractViolation;
use thiserror::Error;

use crate::tabular::TableFormat;

/// Failure turning a [`Table`](scorecard_kernel_contracts::table::Table) into bytes or back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("xlsx writer error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),
    #[error("workbook read error: {0}")]
    WorkbookRead(String),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("table does not fit the {0} format limits")]
    ExceedsLimits(TableFormat),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode or decode {}: {source}", path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("export failed: {0}")]
    Export(#[source] CodecError),
    #[error("{table} row {row} is malformed: {reason}")]
    MalformedRow {
        table: &'static str,
        row: usize,
        reason: String,
    },
    #[error("{table} has no row with key {key}")]
    NotFound { table: &'static str, key: String },
    #[error("{table} already has a row with key {key}")]
    DuplicateKey { table: &'static str, key: String },
    #[error("period {period} already has active attachment {active_id}")]
    ActivePeriodConflict { period: String, active_id: String },
    #[error("contract violation: {0}")]
    ContractViolation(#[from] ContractViolation),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn codec(path: impl Into<PathBuf>, source: CodecError) -> Self {
        Self::Codec {
            path: path.into(),
            source,
        }
    }
}
