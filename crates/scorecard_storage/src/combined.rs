#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use scorecard_kernel_contracts::attachment::AttachmentId;
use scorecard_kernel_contracts::table::{CellValue, Table};
use tracing::{debug, warn};

use crate::layout::NamespaceLayout;
use crate::tabular::{
    read_table_file, remove_file_if_exists, write_table_file, CsvCodec, TableCodec, TableFormat,
    TableLimits, XlsxCodec,
};
use crate::StorageError;

/// Column tagging every combined row with its owning attachment.
pub const ATTACHMENT_ID_COLUMN: &str = "Attachment ID";

/// Where a combined load came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinedSource {
    Primary,
    Flat,
    /// Neither file exists.
    Empty,
    /// A file existed but could not be read; the table was replaced by an empty one.
    RecoveredEmpty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedLoad {
    pub table: Table,
    pub source: CombinedSource,
}

/// Denormalized rows of every non-invalidated attachment, persisted in the
/// primary format while it fits and in the flat format otherwise.
#[derive(Debug, Clone)]
pub struct CombinedStore {
    primary_path: PathBuf,
    flat_path: PathBuf,
    limits: TableLimits,
}

impl CombinedStore {
    pub fn new(primary_path: PathBuf, flat_path: PathBuf, limits: TableLimits) -> Self {
        Self {
            primary_path,
            flat_path,
            limits,
        }
    }

    pub fn for_layout(layout: &NamespaceLayout, limits: TableLimits) -> Self {
        Self::new(
            layout.combined_primary_path(),
            layout.combined_flat_path(),
            limits,
        )
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary_path
    }

    pub fn flat_path(&self) -> &Path {
        &self.flat_path
    }

    pub fn limits(&self) -> TableLimits {
        self.limits
    }

    /// Primary file first, then flat, then an empty table. Read failures never
    /// propagate; they surface as [`CombinedSource::RecoveredEmpty`].
    pub fn load(&self) -> CombinedLoad {
        let mut unreadable = false;
        let xlsx = XlsxCodec::default();
        let attempts: [(&Path, &dyn TableCodec, CombinedSource); 2] = [
            (&self.primary_path, &xlsx, CombinedSource::Primary),
            (&self.flat_path, &CsvCodec, CombinedSource::Flat),
        ];
        for (path, codec, source) in attempts {
            match read_table_file(path, codec) {
                Ok(Some(mut table)) => {
                    table.ensure_column(ATTACHMENT_ID_COLUMN);
                    debug!(path = %path.display(), rows = table.row_count(), "combined data loaded");
                    return CombinedLoad { table, source };
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "combined data unreadable");
                    unreadable = true;
                }
            }
        }
        let source = if unreadable {
            warn!(
                path = %self.primary_path.display(),
                "combined data fell back to an empty table"
            );
            CombinedSource::RecoveredEmpty
        } else {
            CombinedSource::Empty
        };
        CombinedLoad {
            table: Table::with_columns(&[ATTACHMENT_ID_COLUMN]),
            source,
        }
    }

    /// Writes `table` in whichever format fits and removes the other format's
    /// file so the next load cannot read a stale copy.
    pub fn save(&self, table: &Table) -> Result<TableFormat, StorageError> {
        let format = self.limits.format_for(table);
        let (target, stale) = match format {
            TableFormat::Primary => (&self.primary_path, &self.flat_path),
            TableFormat::Flat => (&self.flat_path, &self.primary_path),
        };
        match format {
            TableFormat::Primary => write_table_file(
                target,
                table,
                &XlsxCodec {
                    limits: self.limits,
                },
            )?,
            TableFormat::Flat => write_table_file(target, table, &CsvCodec)?,
        }
        if remove_file_if_exists(stale)? {
            debug!(path = %stale.display(), "stale combined file removed");
        }
        Ok(format)
    }

    pub fn current_format(&self) -> Option<TableFormat> {
        if self.primary_path.exists() {
            Some(TableFormat::Primary)
        } else if self.flat_path.exists() {
            Some(TableFormat::Flat)
        } else {
            None
        }
    }

    pub fn rows_for(&self, id: &AttachmentId) -> Table {
        self.load()
            .table
            .filter_eq(ATTACHMENT_ID_COLUMN, id.as_str())
    }

    /// Drops every row tagged `id`, then appends `rows` tagged `id`, in one write.
    pub fn replace_rows_for(
        &self,
        id: &AttachmentId,
        rows: &Table,
    ) -> Result<TableFormat, StorageError> {
        let mut combined = self.load_for_write();
        strip_rows(&mut combined, id);
        let mut tagged = rows.clone();
        tagged.fill_column(ATTACHMENT_ID_COLUMN, CellValue::text(id.as_str()));
        combined.append(&tagged);
        self.save(&combined)
    }

    /// Returns how many rows were removed.
    pub fn remove_rows_for(&self, id: &AttachmentId) -> Result<usize, StorageError> {
        let mut combined = self.load_for_write();
        let removed = strip_rows(&mut combined, id);
        self.save(&combined)?;
        Ok(removed)
    }

    fn load_for_write(&self) -> Table {
        let load = self.load();
        if load.source == CombinedSource::RecoveredEmpty {
            warn!(
                path = %self.primary_path.display(),
                "rewriting unreadable combined data from an empty table"
            );
        }
        load.table
    }
}

fn strip_rows(table: &mut Table, id: &AttachmentId) -> usize {
    let Some(idx) = table.column_index(ATTACHMENT_ID_COLUMN) else {
        return 0;
    };
    let before = table.row_count();
    table.retain_rows(|row| row[idx].to_text().trim() != id.as_str());
    before - table.row_count()
}
