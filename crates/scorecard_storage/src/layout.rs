#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use scorecard_kernel_contracts::attachment::HISTORY_COLUMNS;
use scorecard_kernel_contracts::audit::AUDIT_COLUMNS;
use scorecard_kernel_contracts::feedback::FEEDBACK_COLUMNS;
use scorecard_kernel_contracts::namespace::NamespaceId;
use scorecard_kernel_contracts::table::Table;
use tracing::info;

use crate::combined::ATTACHMENT_ID_COLUMN;
use crate::tabular::{write_table_file, XlsxCodec};
use crate::StorageError;

/// On-disk locations of one namespace's tables. The legacy `associates`
/// namespace keeps unprefixed file names; every other namespace prefixes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceLayout {
    root: PathBuf,
    namespace: NamespaceId,
}

impl NamespaceLayout {
    pub fn new(root: impl Into<PathBuf>, namespace: NamespaceId) -> Self {
        Self {
            root: root.into(),
            namespace,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespace(&self) -> &NamespaceId {
        &self.namespace
    }

    fn table_file(&self, stem: &str) -> PathBuf {
        if self.namespace.is_legacy() {
            self.root.join(stem)
        } else {
            self.root.join(format!("{}_{stem}", self.namespace))
        }
    }

    pub fn attachments_dir(&self) -> PathBuf {
        if self.namespace.is_legacy() {
            self.root.join("attachments")
        } else {
            self.root.join(format!("attachments_{}", self.namespace))
        }
    }

    pub fn history_path(&self) -> PathBuf {
        self.table_file("history.xlsx")
    }

    pub fn combined_primary_path(&self) -> PathBuf {
        self.table_file("combined_data.xlsx")
    }

    pub fn combined_flat_path(&self) -> PathBuf {
        self.table_file("combined_data.csv")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.table_file("audit_log.xlsx")
    }

    pub fn feedback_path(&self) -> PathBuf {
        self.table_file("monthly_feedback.xlsx")
    }

    pub fn export_prefix(&self) -> String {
        format!("{}_", self.namespace)
    }

    pub fn saved_path_for(&self, file_name: &str) -> PathBuf {
        self.attachments_dir().join(file_name)
    }

    /// Creates the directories and header-only tables that do not exist yet.
    /// Existing files are never touched.
    pub fn ensure_storage(&self) -> Result<(), StorageError> {
        for dir in [self.root.clone(), self.attachments_dir()] {
            fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        }
        let codec = XlsxCodec::default();
        let tables: [(PathBuf, &[&str]); 3] = [
            (self.history_path(), &HISTORY_COLUMNS),
            (self.audit_path(), &AUDIT_COLUMNS),
            (self.feedback_path(), &FEEDBACK_COLUMNS),
        ];
        for (path, columns) in tables {
            if !path.exists() {
                write_table_file(&path, &Table::with_columns(columns), &codec)?;
                info!(namespace = %self.namespace, path = %path.display(), "created table");
            }
        }
        let combined = self.combined_primary_path();
        if !combined.exists() && !self.combined_flat_path().exists() {
            write_table_file(&combined, &Table::with_columns(&[ATTACHMENT_ID_COLUMN]), &codec)?;
            info!(namespace = %self.namespace, path = %combined.display(), "created table");
        }
        Ok(())
    }
}
