#![forbid(unsafe_code)]

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use scorecard_engines::naming::derive_saved_file_name;
use scorecard_engines::percent::PercentNormalizer;
use scorecard_engines::period::derive_reporting_period;
use scorecard_engines::sheet::{SheetParseError, UploadSheetParser};
use scorecard_kernel_contracts::attachment::{AttachmentId, AttachmentRecord};
use scorecard_kernel_contracts::audit::{AuditAction, AuditEntry};
use scorecard_kernel_contracts::feedback::FeedbackEntry;
use scorecard_kernel_contracts::namespace::NamespaceId;
use scorecard_kernel_contracts::period::ReportingPeriod;
use scorecard_kernel_contracts::table::Table;
use scorecard_kernel_contracts::ContractViolation;
use scorecard_storage::audit_log::AuditLog;
use scorecard_storage::cache::TableCache;
use scorecard_storage::combined::{
    CombinedLoad, CombinedSource, CombinedStore, ATTACHMENT_ID_COLUMN,
};
use scorecard_storage::feedback::FeedbackStore;
use scorecard_storage::history::{delete_backing_file, HistoryLedger, HistoryTable};
use scorecard_storage::layout::NamespaceLayout;
use scorecard_storage::tabular::{atomic_write, TableFormat};
use scorecard_storage::StorageError;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::{SystemWallClock, WallClock};
use crate::config::StoreConfig;

/// Rows echoed back to the uploader.
pub const UPLOAD_PREVIEW_ROWS: usize = 20;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("file is {size} bytes; the limit is {limit} bytes")]
    SizeExceeded { size: u64, limit: u64 },
    #[error("{0}")]
    FormatError(String),
    #[error("missing required columns in Data sheet: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("attachment {0} not found")]
    NotFound(AttachmentId),
    #[error("original file for attachment {id} is missing at {}; re-upload it", path.display())]
    FileMissing { id: AttachmentId, path: PathBuf },
    #[error("attachment {0} is invalidated")]
    AttachmentInvalidated(AttachmentId),
    #[error(transparent)]
    IoFailure(#[from] StorageError),
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}

impl From<SheetParseError> for AttachmentError {
    fn from(e: SheetParseError) -> Self {
        Self::FormatError(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub record: AttachmentRecord,
    pub superseded: Vec<AttachmentId>,
    pub combined_format: TableFormat,
    pub preview: Table,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidateOutcome {
    pub record: AttachmentRecord,
    pub rows_removed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreOutcome {
    pub record: AttachmentRecord,
    pub displaced: Vec<AttachmentId>,
    pub rows_restored: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackInput {
    pub domain_id: String,
    pub name: String,
    pub period: ReportingPeriod,
    pub team_lead: String,
    pub text: String,
    pub entered_by: String,
}

/// One namespace's attachment version store: the history ledger, combined
/// rows, audit log and feedback table, kept consistent across upload,
/// invalidation, restore and admin edits.
#[derive(Debug)]
pub struct AttachmentVersionStore<C: WallClock = SystemWallClock> {
    layout: NamespaceLayout,
    max_upload_bytes: u64,
    history: HistoryLedger,
    combined: CombinedStore,
    audit: AuditLog,
    feedback: FeedbackStore,
    cache: Arc<TableCache>,
    parser: UploadSheetParser,
    normalizer: PercentNormalizer,
    clock: C,
}

impl AttachmentVersionStore<SystemWallClock> {
    pub fn open(
        config: &StoreConfig,
        namespace: NamespaceId,
        cache: Arc<TableCache>,
    ) -> Result<Self, AttachmentError> {
        Self::open_with_clock(config, namespace, cache, SystemWallClock)
    }
}

impl<C: WallClock> AttachmentVersionStore<C> {
    /// Opens the namespace, creating any missing directories and tables.
    pub fn open_with_clock(
        config: &StoreConfig,
        namespace: NamespaceId,
        cache: Arc<TableCache>,
        clock: C,
    ) -> Result<Self, AttachmentError> {
        let layout = NamespaceLayout::new(config.data_dir.clone(), namespace);
        layout.ensure_storage()?;
        Ok(Self {
            history: HistoryLedger::new(layout.history_path()),
            combined: CombinedStore::for_layout(&layout, config.table_limits),
            audit: AuditLog::new(layout.audit_path()),
            feedback: FeedbackStore::new(layout.feedback_path()),
            max_upload_bytes: config.max_upload_bytes,
            layout,
            cache,
            parser: UploadSheetParser::default(),
            normalizer: PercentNormalizer::default(),
            clock,
        })
    }

    pub fn namespace(&self) -> &NamespaceId {
        self.layout.namespace()
    }

    pub fn layout(&self) -> &NamespaceLayout {
        &self.layout
    }

    pub fn combined_store(&self) -> &CombinedStore {
        &self.combined
    }

    pub(crate) fn now(&self) -> chrono::NaiveDateTime {
        self.clock.now()
    }

    /// Parse, validate and normalize workbook bytes. No side effects.
    fn prepare_rows(&self, bytes: &[u8]) -> Result<Table, AttachmentError> {
        let table = self.parser.parse(bytes)?;
        let missing = self.parser.missing_columns(&table);
        if !missing.is_empty() {
            return Err(AttachmentError::MissingColumns(missing));
        }
        Ok(self.normalizer.normalize(&table))
    }

    pub fn upload(
        &self,
        name: &str,
        bytes: &[u8],
        uploader: &str,
        source_url: Option<&str>,
    ) -> Result<UploadOutcome, AttachmentError> {
        let size = bytes.len() as u64;
        if size > self.max_upload_bytes {
            return Err(AttachmentError::SizeExceeded {
                size,
                limit: self.max_upload_bytes,
            });
        }
        let rows = self.prepare_rows(bytes)?;

        let now = self.now();
        let period = derive_reporting_period(&rows, now);
        let id = AttachmentId::new(Uuid::new_v4().to_string())?;
        let saved_path = self
            .layout
            .saved_path_for(&derive_saved_file_name(period, name));
        let record = AttachmentRecord::v1_uploaded(
            id.clone(),
            name.to_string(),
            saved_path.clone(),
            uploader.to_string(),
            now,
            period,
            rows.row_count() as u64,
            source_url.map(str::to_string),
        )?;
        let audit = AuditEntry::v1(
            now,
            AuditAction::Upload,
            &id,
            name.to_string(),
            uploader.to_string(),
        )?;

        atomic_write(&saved_path, bytes)?;
        let superseded = self
            .history
            .supersede_and_append(record.clone())?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let combined_format = self.combined.replace_rows_for(&id, &rows)?;
        self.audit.append(&audit)?;
        self.cache.invalidate_namespace(self.namespace());

        info!(
            namespace = %self.namespace(),
            attachment_id = %id,
            period = %period,
            rows = rows.row_count(),
            "attachment uploaded"
        );
        let preview = Table::from_rows(
            rows.columns().to_vec(),
            rows.rows().iter().take(UPLOAD_PREVIEW_ROWS).cloned().collect(),
        )?;
        Ok(UploadOutcome {
            record,
            superseded,
            combined_format,
            preview,
            message: format!("Uploaded and processed for month {period}."),
        })
    }

    fn find_record(&self, id: &AttachmentId) -> Result<AttachmentRecord, AttachmentError> {
        self.history
            .load()?
            .get(id)
            .cloned()
            .ok_or_else(|| AttachmentError::NotFound(id.clone()))
    }

    pub fn invalidate(
        &self,
        id: &AttachmentId,
        user: &str,
    ) -> Result<InvalidateOutcome, AttachmentError> {
        let history = self.history.load()?;
        let existing = history
            .get(id)
            .cloned()
            .ok_or_else(|| AttachmentError::NotFound(id.clone()))?;
        let file_shared = history.backing_file_shared(id, &existing.saved_path);
        let audit = AuditEntry::v1(
            self.now(),
            AuditAction::InvalidationCleanup,
            id,
            existing.filename.clone(),
            user.to_string(),
        )?;

        let record = self.history.invalidate(id)?;
        let rows_removed = self.combined.remove_rows_for(id)?;
        if file_shared {
            info!(
                attachment_id = %id,
                path = %record.saved_path.display(),
                "backing file kept; another attachment still uses it"
            );
        } else {
            delete_backing_file(&record.saved_path);
        }
        self.audit.append(&audit)?;
        self.cache.invalidate_namespace(self.namespace());

        info!(
            namespace = %self.namespace(),
            attachment_id = %id,
            rows_removed,
            "attachment invalidated"
        );
        Ok(InvalidateOutcome {
            record,
            rows_removed,
        })
    }

    /// Rebuilds the attachment's combined rows from its original file and marks
    /// it valid. The file on disk is the only source; combined rows are never reused.
    pub fn restore(
        &self,
        id: &AttachmentId,
        make_active: bool,
        user: &str,
    ) -> Result<RestoreOutcome, AttachmentError> {
        let existing = self.find_record(id)?;
        let bytes = match fs::read(&existing.saved_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(AttachmentError::FileMissing {
                    id: id.clone(),
                    path: existing.saved_path.clone(),
                })
            }
            Err(e) => {
                return Err(StorageError::Io {
                    path: existing.saved_path.clone(),
                    source: e,
                }
                .into())
            }
        };
        let rows = self.prepare_rows(&bytes)?;
        let audit = AuditEntry::v1(
            self.now(),
            AuditAction::restore(make_active),
            id,
            existing.filename.clone(),
            user.to_string(),
        )?;

        self.combined.replace_rows_for(id, &rows)?;
        let displaced = self.history.restore(id, make_active)?;
        self.audit.append(&audit)?;
        self.cache.invalidate_namespace(self.namespace());

        let record = self.find_record(id)?;
        info!(
            namespace = %self.namespace(),
            attachment_id = %id,
            make_active,
            active = record.active,
            rows = rows.row_count(),
            "attachment restored"
        );
        Ok(RestoreOutcome {
            record,
            displaced,
            rows_restored: rows.row_count(),
        })
    }

    /// Replaces the combined rows of `id` with edited rows. The original file
    /// and the ledger record are left as they are.
    pub fn admin_edit(
        &self,
        id: &AttachmentId,
        rows: &Table,
        user: &str,
    ) -> Result<TableFormat, AttachmentError> {
        let existing = self.find_record(id)?;
        if existing.is_invalid() {
            return Err(AttachmentError::AttachmentInvalidated(id.clone()));
        }
        let audit = AuditEntry::v1(
            self.now(),
            AuditAction::AdminSaveEdit,
            id,
            existing.filename.clone(),
            user.to_string(),
        )?;
        let mut edited = rows.clone();
        edited.drop_columns(&[ATTACHMENT_ID_COLUMN.to_string()]);
        let edited = self.normalizer.normalize(&edited);

        let format = self.combined.replace_rows_for(id, &edited)?;
        self.audit.append(&audit)?;
        self.cache.invalidate_namespace(self.namespace());
        info!(
            namespace = %self.namespace(),
            attachment_id = %id,
            rows = edited.row_count(),
            "admin edit saved"
        );
        Ok(format)
    }

    pub fn upsert_feedback(&self, input: FeedbackInput) -> Result<FeedbackEntry, AttachmentError> {
        let entry = FeedbackEntry::v1(
            input.domain_id,
            input.name,
            input.period,
            input.team_lead,
            input.text,
            self.now(),
            input.entered_by,
        )?;
        self.feedback.upsert(&entry)?;
        Ok(entry)
    }

    pub fn feedback_for(&self, domain_id: &str, period: ReportingPeriod) -> Option<FeedbackEntry> {
        self.feedback.latest_for(domain_id, &period.to_string())
    }

    pub fn feedback_entries(&self) -> Vec<FeedbackEntry> {
        self.feedback.entries()
    }

    /// Cached read of the history ledger.
    pub fn history(&self) -> Result<Arc<HistoryTable>, AttachmentError> {
        Ok(self
            .cache
            .history_or_load(self.namespace(), || self.history.load())?)
    }

    /// Cached read of the combined rows, with their provenance.
    pub fn combined(&self) -> Arc<CombinedLoad> {
        self.cache
            .combined_or_load(self.namespace(), || self.combined.load())
    }

    pub fn record(&self, id: &AttachmentId) -> Result<AttachmentRecord, AttachmentError> {
        self.history()?
            .get(id)
            .cloned()
            .ok_or_else(|| AttachmentError::NotFound(id.clone()))
    }

    pub fn latest_active(&self) -> Result<Option<AttachmentRecord>, AttachmentError> {
        Ok(self.history()?.latest_active().cloned())
    }

    pub fn audit_entries(&self) -> Result<Vec<AuditEntry>, AttachmentError> {
        Ok(self.audit.entries()?)
    }

    pub(crate) fn warn_if_recovered(&self, load: &CombinedLoad) {
        if load.source == CombinedSource::RecoveredEmpty {
            warn!(
                namespace = %self.namespace(),
                "combined data could not be read; views are empty"
            );
        }
    }
}
