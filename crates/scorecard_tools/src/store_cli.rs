#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use scorecard_kernel_contracts::attachment::AttachmentId;
use scorecard_kernel_contracts::common::TIMESTAMP_FORMAT;
use scorecard_kernel_contracts::namespace::NamespaceId;
use scorecard_kernel_contracts::period::ReportingPeriod;
use scorecard_os::attachment_store::FeedbackInput;
use scorecard_os::{AttachmentVersionStore, StoreConfig};
use scorecard_storage::cache::TableCache;
use scorecard_storage::tabular::ExportArtifact;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "scorecard")]
#[command(about = "Versioned monthly scorecard attachments")]
#[command(version)]
pub struct Cli {
    /// Dashboard namespace
    #[arg(long, global = true, default_value = "associates")]
    pub namespace: String,

    /// Data root; overrides SCORECARD_DATA_DIR
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: StoreCommand,
}

#[derive(Debug, Subcommand)]
pub enum StoreCommand {
    /// Create the namespace's directories and empty tables
    Init,

    /// Upload a monthly workbook
    Upload {
        file: PathBuf,
        #[arg(long)]
        uploader: String,
        #[arg(long)]
        source_url: Option<String>,
        /// Name to record instead of the file's own name
        #[arg(long)]
        name: Option<String>,
    },

    /// Invalidate an attachment and purge its rows
    Invalidate {
        id: String,
        #[arg(long)]
        user: String,
    },

    /// Rebuild an attachment's rows from its original file
    Restore {
        id: String,
        #[arg(long)]
        user: String,
        /// Also make it the active attachment for its month
        #[arg(long)]
        activate: bool,
    },

    /// List the history ledger
    History,

    /// List the audit log
    Audit,

    /// Record feedback for a domain and month (YYYY-MM)
    FeedbackSet {
        domain_id: String,
        period: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        team_lead: String,
    },

    /// Show the latest feedback for a domain and month (YYYY-MM)
    FeedbackGet { domain_id: String, period: String },

    /// Write combined data and history downloads into a directory
    Export {
        out_dir: PathBuf,
        /// Leave out columns that are entirely empty or unnamed
        #[arg(long)]
        hide_empty: bool,
    },
}

/// Environment config with `--data-dir` applied on top.
pub fn resolve_config(cli: &Cli) -> Result<StoreConfig, String> {
    let mut config = StoreConfig::from_env().map_err(|e| format!("invalid configuration: {e}"))?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

pub fn execute_store_command(cli: &Cli, config: &StoreConfig) -> Result<String, String> {
    let namespace =
        NamespaceId::new(cli.namespace.as_str()).map_err(|e| format!("invalid namespace: {e}"))?;
    let cache = Arc::new(TableCache::new(config.cache_ttl));
    let store = AttachmentVersionStore::open(config, namespace, cache)
        .map_err(|e| format!("failed to open store: {e}"))?;
    debug!(namespace = %store.namespace(), command = ?cli.command, "executing");

    match &cli.command {
        StoreCommand::Init => Ok(format!(
            "initialized {} under {}",
            store.namespace(),
            store.layout().root().display()
        )),
        StoreCommand::Upload {
            file,
            uploader,
            source_url,
            name,
        } => {
            let bytes = fs::read(file).map_err(|e| format!("failed to read {}: {e}", file.display()))?;
            let name = match name {
                Some(n) => n.clone(),
                None => file_name_of(file)?,
            };
            let out = store
                .upload(&name, &bytes, uploader, source_url.as_deref())
                .map_err(|e| format!("upload failed: {e}"))?;
            let mut lines = vec![out.message, format!("id: {}", out.record.id)];
            lines.extend(out.superseded.iter().map(|id| format!("superseded: {id}")));
            lines.push(format!(
                "rows: {} ({})",
                out.record.rows_count, out.combined_format
            ));
            Ok(lines.join("\n"))
        }
        StoreCommand::Invalidate { id, user } => {
            let out = store
                .invalidate(&parse_id(id)?, user)
                .map_err(|e| format!("invalidate failed: {e}"))?;
            Ok(format!(
                "invalidated {} ({} rows removed)",
                out.record.id, out.rows_removed
            ))
        }
        StoreCommand::Restore { id, user, activate } => {
            let out = store
                .restore(&parse_id(id)?, *activate, user)
                .map_err(|e| format!("restore failed: {e}"))?;
            let mut lines = vec![format!(
                "restored {} ({} rows, active: {})",
                out.record.id,
                out.rows_restored,
                yes_no(out.record.active)
            )];
            lines.extend(out.displaced.iter().map(|id| format!("displaced: {id}")));
            Ok(lines.join("\n"))
        }
        StoreCommand::History => {
            let history = store
                .history()
                .map_err(|e| format!("failed to read history: {e}"))?;
            Ok(history
                .records()
                .iter()
                .map(|r| {
                    [
                        r.id.to_string(),
                        r.reporting_period.to_string(),
                        yes_no(r.active).to_string(),
                        r.validation_status.as_str().to_string(),
                        r.uploaded_at.format(TIMESTAMP_FORMAT).to_string(),
                        r.filename.clone(),
                    ]
                    .join("\t")
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        StoreCommand::Audit => {
            let entries = store
                .audit_entries()
                .map_err(|e| format!("failed to read audit log: {e}"))?;
            Ok(entries
                .iter()
                .map(|e| {
                    [
                        e.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                        e.action.clone(),
                        e.attachment_id.clone(),
                        e.performed_by.clone(),
                    ]
                    .join("\t")
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        StoreCommand::FeedbackSet {
            domain_id,
            period,
            text,
            user,
            name,
            team_lead,
        } => {
            let entry = store
                .upsert_feedback(FeedbackInput {
                    domain_id: domain_id.clone(),
                    name: name.clone(),
                    period: parse_period(period)?,
                    team_lead: team_lead.clone(),
                    text: text.clone(),
                    entered_by: user.clone(),
                })
                .map_err(|e| format!("failed to save feedback: {e}"))?;
            Ok(format!("saved feedback for {} {}", entry.domain_id, entry.month))
        }
        StoreCommand::FeedbackGet { domain_id, period } => {
            match store.feedback_for(domain_id, parse_period(period)?) {
                Some(e) => Ok(format!(
                    "{}\t{}\t{}",
                    e.timestamp.format(TIMESTAMP_FORMAT),
                    e.entered_by,
                    e.feedback
                )),
                None => Ok(String::new()),
            }
        }
        StoreCommand::Export {
            out_dir,
            hide_empty,
        } => {
            fs::create_dir_all(out_dir)
                .map_err(|e| format!("failed to create {}: {e}", out_dir.display()))?;
            let combined = store.combined().table.clone();
            let history = store
                .history()
                .map_err(|e| format!("failed to read history: {e}"))?
                .to_table();
            let mut written = Vec::new();
            for (table, base) in [(combined, "combined_data"), (history, "history")] {
                let artifact = store
                    .export_table(&table, base, *hide_empty)
                    .map_err(|e| format!("export failed: {e}"))?;
                written.push(write_artifact(out_dir, &artifact)?);
            }
            Ok(written
                .iter()
                .map(|p| format!("wrote {}", p.display()))
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }
}

fn write_artifact(dir: &Path, artifact: &ExportArtifact) -> Result<PathBuf, String> {
    let path = dir.join(&artifact.file_name);
    fs::write(&path, &artifact.bytes)
        .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    Ok(path)
}

fn parse_id(raw: &str) -> Result<AttachmentId, String> {
    AttachmentId::new(raw).map_err(|e| format!("invalid attachment id '{raw}': {e}"))
}

fn parse_period(raw: &str) -> Result<ReportingPeriod, String> {
    raw.parse::<ReportingPeriod>()
        .map_err(|e| format!("invalid period '{raw}': {e}"))
}

fn file_name_of(path: &Path) -> Result<String, String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("cannot take a file name from {}", path.display()))
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
