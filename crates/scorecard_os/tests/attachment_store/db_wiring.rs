#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use rust_xlsxwriter::Workbook;
use scorecard_kernel_contracts::attachment::{AttachmentId, AttachmentRecord, ValidationStatus};
use scorecard_kernel_contracts::namespace::NamespaceId;
use scorecard_kernel_contracts::period::ReportingPeriod;
use scorecard_kernel_contracts::table::{CellValue, Table};
use scorecard_os::attachment_store::FeedbackInput;
use scorecard_os::clock::SteppingClock;
use scorecard_os::views::{attachment_ids, FEEDBACK_TEXT_COLUMN, RANK_COLUMN, REPORTING_MONTH_COLUMN};
use scorecard_os::{AttachmentError, AttachmentVersionStore, StoreConfig};
use scorecard_storage::cache::{CachedTable, TableCache};
use scorecard_storage::combined::{CombinedSource, ATTACHMENT_ID_COLUMN};
use scorecard_storage::tabular::TableFormat;

type Store = AttachmentVersionStore<SteppingClock>;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 15)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

fn workbook(month: Option<&str>, rows: &[(&str, &str)]) -> Vec<u8> {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("Data").unwrap();
    ws.write_string(0, 0, "Monthly scorecard export").unwrap();
    let mut header = vec![
        "Domain ID",
        "Function",
        "Function Lead",
        "Team Lead",
        "Name",
        "Final Score",
    ];
    if month.is_some() {
        header.push("Month");
    }
    for (c, h) in header.iter().enumerate() {
        ws.write_string(1, c as u16, *h).unwrap();
    }
    for (i, (domain, score)) in rows.iter().enumerate() {
        let r = (i + 2) as u32;
        ws.write_string(r, 0, *domain).unwrap();
        ws.write_string(r, 1, "Operations").unwrap();
        ws.write_string(r, 2, "Function Lead A").unwrap();
        ws.write_string(r, 3, "Team Lead B").unwrap();
        ws.write_string(r, 4, format!("Associate {i}")).unwrap();
        ws.write_string(r, 5, *score).unwrap();
        if let Some(m) = month {
            ws.write_string(r, 6, m).unwrap();
        }
    }
    wb.save_to_buffer().unwrap()
}

fn jan(rows: &[(&str, &str)]) -> Vec<u8> {
    workbook(Some("2025-01"), rows)
}

struct Harness {
    _dir: tempfile::TempDir,
    config: StoreConfig,
    cache: Arc<TableCache>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(|c| c)
    }

    fn with_config(f: impl FnOnce(StoreConfig) -> StoreConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = f(StoreConfig::mvp_v1(dir.path()));
        Self {
            _dir: dir,
            config,
            cache: Arc::new(TableCache::default()),
        }
    }

    fn store(&self, ns: &str) -> Store {
        AttachmentVersionStore::open_with_clock(
            &self.config,
            NamespaceId::new(ns).unwrap(),
            Arc::clone(&self.cache),
            SteppingClock::new(start(), 60),
        )
        .unwrap()
    }
}

fn record(s: &Store, id: &AttachmentId) -> AttachmentRecord {
    s.record(id).unwrap()
}

fn combined_rows_for(s: &Store, id: &AttachmentId) -> usize {
    s.combined()
        .table
        .filter_eq(ATTACHMENT_ID_COLUMN, id.as_str())
        .row_count()
}

fn audit_actions(s: &Store) -> Vec<String> {
    s.audit_entries()
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect()
}

/// At most one active record per period, and combined rows exist for an id
/// only when its record is not invalid.
fn assert_store_invariants(s: &Store) {
    let history = s.history().unwrap();
    let mut active: HashMap<ReportingPeriod, usize> = HashMap::new();
    for r in history.records().iter().filter(|r| r.active) {
        *active.entry(r.reporting_period).or_default() += 1;
    }
    assert!(active.values().all(|n| *n <= 1), "{active:?}");
    let ids = attachment_ids(&s.combined().table);
    for r in history.records() {
        if r.validation_status == ValidationStatus::Invalid {
            assert!(!ids.contains(r.id.as_str()), "invalid {} still has rows", r.id);
        }
    }
}

#[test]
fn at_store_db_01_supersede_keeps_one_active_and_keeps_rows() {
    let h = Harness::new();
    let s = h.store("associates");
    let up1 = s
        .upload("f1.xlsx", &jan(&[("D1", "0.97"), ("D2", "0.85")]), "admin", None)
        .unwrap();
    let r1 = up1.record.id.clone();
    assert_eq!(up1.record.reporting_period.to_string(), "2025-01");
    assert_eq!(up1.message, "Uploaded and processed for month 2025-01.");
    assert!(record(&s, &r1).active);
    assert_eq!(combined_rows_for(&s, &r1), 2);

    let up2 = s
        .upload("f2.xlsx", &jan(&[("D1", "0.91")]), "admin", Some("https://x/y"))
        .unwrap();
    let r2 = up2.record.id.clone();
    assert_eq!(up2.superseded, vec![r1.clone()]);

    let old = record(&s, &r1);
    assert!(!old.active);
    assert_eq!(old.superseded_by, Some(r2.clone()));
    assert_eq!(old.validation_status, ValidationStatus::Valid);
    assert!(!old.saved_path.exists());
    assert!(record(&s, &r2).active);
    assert_eq!(record(&s, &r2).source_url, "https://x/y");

    assert_eq!(combined_rows_for(&s, &r1), 2);
    assert_eq!(combined_rows_for(&s, &r2), 1);
    assert_eq!(audit_actions(&s), vec!["Upload", "Upload"]);
    assert_store_invariants(&s);
}

#[test]
fn at_store_db_02_invalidate_purges_rows_and_file() {
    let h = Harness::new();
    let s = h.store("ba");
    let up = s
        .upload("f1.xlsx", &jan(&[("D1", "0.97")]), "admin", None)
        .unwrap();
    let id = up.record.id.clone();
    assert!(up.record.saved_path.exists());

    let out = s.invalidate(&id, "auditor").unwrap();
    assert_eq!(out.rows_removed, 1);
    let r = record(&s, &id);
    assert!(!r.active);
    assert_eq!(r.validation_status, ValidationStatus::Invalid);
    assert_eq!(combined_rows_for(&s, &id), 0);
    assert!(!r.saved_path.exists());

    let entries = s.audit_entries().unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.action, "Invalidation & Cleanup");
    assert_eq!(last.performed_by, "auditor");
    assert_eq!(last.attachment_id, id.as_str());
    assert_eq!(
        entries
            .iter()
            .filter(|e| e.action == "Invalidation & Cleanup")
            .count(),
        1
    );
    assert_store_invariants(&s);
}

#[test]
fn at_store_db_03_restore_inactive_rebuilds_rows_from_disk() {
    let h = Harness::new();
    let s = h.store("pe");
    let bytes = jan(&[("D1", "0.97"), ("D2", "0.5")]);
    let id = s.upload("f1.xlsx", &bytes, "admin", None).unwrap().record.id;
    s.invalidate(&id, "admin").unwrap();
    let path = record(&s, &id).saved_path;
    fs::write(&path, &bytes).unwrap();

    let out = s.restore(&id, false, "admin").unwrap();
    assert_eq!(out.rows_restored, 2);
    assert!(out.displaced.is_empty());
    let r = record(&s, &id);
    assert_eq!(r.validation_status, ValidationStatus::Valid);
    assert!(!r.active);
    assert_eq!(combined_rows_for(&s, &id), 2);
    assert_eq!(audit_actions(&s).last().unwrap(), "Restore Valid");
    assert_store_invariants(&s);
}

#[test]
fn at_store_db_04_restore_active_displaces_current() {
    let h = Harness::new();
    let s = h.store("tl");
    let bytes1 = jan(&[("D1", "0.97")]);
    let r1 = s.upload("f1.xlsx", &bytes1, "admin", None).unwrap().record;
    let r2 = s
        .upload("f2.xlsx", &jan(&[("D1", "0.5")]), "admin", None)
        .unwrap()
        .record;
    fs::write(&r1.saved_path, &bytes1).unwrap();

    let out = s.restore(&r1.id, true, "admin").unwrap();
    assert_eq!(out.displaced, vec![r2.id.clone()]);
    let now1 = record(&s, &r1.id);
    assert!(now1.active);
    assert_eq!(now1.superseded_by, None);
    let now2 = record(&s, &r2.id);
    assert!(!now2.active);
    assert_eq!(now2.superseded_by, Some(r1.id.clone()));
    assert!(now2.saved_path.exists());
    assert_eq!(combined_rows_for(&s, &r1.id), 1);
    assert_eq!(audit_actions(&s).last().unwrap(), "Restore Valid (active)");
    assert_eq!(s.latest_active().unwrap().unwrap().id, r1.id);
    assert_store_invariants(&s);
}

#[test]
fn at_store_db_05_restore_without_file_changes_nothing() {
    let h = Harness::new();
    let s = h.store("pl");
    let id = s
        .upload("f1.xlsx", &jan(&[("D1", "0.97")]), "admin", None)
        .unwrap()
        .record
        .id;
    s.invalidate(&id, "admin").unwrap();
    let before = (*s.history().unwrap()).clone();
    let audit_before = s.audit_entries().unwrap().len();

    let err = s.restore(&id, true, "admin").unwrap_err();
    assert!(matches!(err, AttachmentError::FileMissing { .. }), "{err}");
    assert_eq!(*s.history().unwrap(), before);
    assert_eq!(s.audit_entries().unwrap().len(), audit_before);
    assert_eq!(combined_rows_for(&s, &id), 0);
}

#[test]
fn at_store_db_06_feedback_upsert_keeps_latest_text() {
    let h = Harness::new();
    let s = h.store("associates");
    let period = ReportingPeriod::v1(2025, 1).unwrap();
    for text in ["needs work", "much better"] {
        s.upsert_feedback(FeedbackInput {
            domain_id: "D1".into(),
            name: "Associate 0".into(),
            period,
            team_lead: "Team Lead B".into(),
            text: text.into(),
            entered_by: "lead".into(),
        })
        .unwrap();
    }
    assert_eq!(s.feedback_for("D1", period).unwrap().feedback, "much better");
    assert_eq!(s.feedback_entries().len(), 1);

    let too_long = s.upsert_feedback(FeedbackInput {
        domain_id: "D1".into(),
        name: String::new(),
        period,
        team_lead: String::new(),
        text: "x".repeat(501),
        entered_by: "lead".into(),
    });
    assert!(matches!(too_long, Err(AttachmentError::ContractViolation(_))));
}

#[test]
fn at_store_db_07_rejected_uploads_leave_no_trace() {
    let h = Harness::with_config(|c| c.with_max_upload_bytes(64 * 1024));
    let s = h.store("associates");

    let huge = vec![0u8; 64 * 1024 + 1];
    assert!(matches!(
        s.upload("big.xlsx", &huge, "admin", None),
        Err(AttachmentError::SizeExceeded { .. })
    ));

    let mut wb = Workbook::new();
    wb.add_worksheet().set_name("Summary").unwrap();
    let no_data = wb.save_to_buffer().unwrap();
    assert!(matches!(
        s.upload("nodata.xlsx", &no_data, "admin", None),
        Err(AttachmentError::FormatError(_))
    ));

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("Data").unwrap();
    ws.write_string(0, 0, "Domain ID").unwrap();
    ws.write_string(0, 1, "Function").unwrap();
    ws.write_string(1, 0, "D1").unwrap();
    let partial = wb.save_to_buffer().unwrap();
    match s.upload("partial.xlsx", &partial, "admin", None) {
        Err(AttachmentError::MissingColumns(missing)) => {
            assert_eq!(missing, vec!["Function Lead", "Team Lead"]);
        }
        other => panic!("unexpected {other:?}"),
    }

    assert!(s.history().unwrap().is_empty());
    assert!(s.audit_entries().unwrap().is_empty());
    assert_eq!(fs::read_dir(s.layout().attachments_dir()).unwrap().count(), 0);
}

#[test]
fn at_store_db_08_period_falls_back_to_clock_and_values_normalize() {
    let h = Harness::new();
    let s = h.store("associates");
    let up = s
        .upload("nomonth.xlsx", &workbook(None, &[("D1", "0.97"), ("D2", "97,5 %")]), "admin", None)
        .unwrap();
    assert_eq!(up.record.reporting_period.to_string(), "2025-06");
    assert_eq!(up.record.rows_count, 2);
    assert!(up
        .record
        .saved_path
        .ends_with("attachments/2025-06_nomonth.xlsx"));

    let rows = s.combined().table.filter_eq(ATTACHMENT_ID_COLUMN, up.record.id.as_str());
    assert_eq!(rows.cell(0, "Final Score"), Some(&CellValue::text("97%")));
    assert_eq!(rows.cell(1, "Final Score"), Some(&CellValue::text("97.5%")));
    assert_eq!(rows.cell(0, "Final Score_num"), Some(&CellValue::Number(97.0)));
    assert_eq!(rows.cell(1, "Final Score_num"), Some(&CellValue::Number(97.5)));
}

#[test]
fn at_store_db_09_admin_edit_replaces_rows_only() {
    let h = Harness::new();
    let s = h.store("associates");
    let up = s
        .upload("f1.xlsx", &jan(&[("D1", "0.97"), ("D2", "0.85")]), "admin", None)
        .unwrap();
    let id = up.record.id.clone();

    let mut edited = Table::with_columns(&["Domain ID", "Final Score"]);
    edited
        .push_row(vec![CellValue::text("D1"), CellValue::text("0.5")])
        .unwrap();
    s.admin_edit(&id, &edited, "admin").unwrap();

    let rows = s.combined().table.filter_eq(ATTACHMENT_ID_COLUMN, id.as_str());
    assert_eq!(rows.row_count(), 1);
    assert_eq!(rows.cell(0, "Final Score"), Some(&CellValue::text("50%")));
    assert!(up.record.saved_path.exists());
    assert_eq!(record(&s, &id).rows_count, 2);
    assert_eq!(audit_actions(&s).last().unwrap(), "Admin Save Edit");

    s.invalidate(&id, "admin").unwrap();
    assert!(matches!(
        s.admin_edit(&id, &edited, "admin"),
        Err(AttachmentError::AttachmentInvalidated(_))
    ));
    let unknown = AttachmentId::new("no-such-id").unwrap();
    assert!(matches!(
        s.admin_edit(&unknown, &edited, "admin"),
        Err(AttachmentError::NotFound(_))
    ));
    assert!(matches!(
        s.invalidate(&unknown, "admin"),
        Err(AttachmentError::NotFound(_))
    ));
}

#[test]
fn at_store_db_10_monthly_view_merges_feedback_and_ranks() {
    let h = Harness::new();
    let s = h.store("associates");
    assert!(s.latest_monthly_view().unwrap().is_none());
    s.upload("f1.xlsx", &jan(&[("D1", "0.85"), ("D2", "0.97")]), "admin", None)
        .unwrap();
    s.upsert_feedback(FeedbackInput {
        domain_id: "D1".into(),
        name: "Associate 0".into(),
        period: ReportingPeriod::v1(2025, 1).unwrap(),
        team_lead: "Team Lead B".into(),
        text: "keep going".into(),
        entered_by: "lead".into(),
    })
    .unwrap();

    let view = s.latest_monthly_view().unwrap().unwrap();
    assert_eq!(view.rows.row_count(), 2);
    assert_eq!(
        view.rows.cell(0, FEEDBACK_TEXT_COLUMN),
        Some(&CellValue::text("keep going"))
    );
    assert_eq!(view.rows.cell(1, FEEDBACK_TEXT_COLUMN), Some(&CellValue::Empty));
    assert_eq!(view.rows.cell(0, RANK_COLUMN), Some(&CellValue::Number(2.0)));
    assert_eq!(view.rows.cell(1, RANK_COLUMN), Some(&CellValue::Number(1.0)));
}

#[test]
fn at_store_db_11_active_rows_skip_superseded_attachments() {
    let h = Harness::new();
    let s = h.store("associates");
    let r1 = s
        .upload("jan1.xlsx", &jan(&[("D1", "0.5")]), "admin", None)
        .unwrap()
        .record
        .id;
    let r2 = s
        .upload("jan2.xlsx", &jan(&[("D1", "0.6")]), "admin", None)
        .unwrap()
        .record
        .id;
    let r3 = s
        .upload("feb.xlsx", &workbook(Some("2025-02"), &[("D1", "0.7")]), "admin", None)
        .unwrap()
        .record
        .id;

    let active = s.active_rows().unwrap();
    let ids = attachment_ids(&active);
    assert!(!ids.contains(r1.as_str()));
    assert!(ids.contains(r2.as_str()));
    assert!(ids.contains(r3.as_str()));
    let months: Vec<String> = active
        .column_values(REPORTING_MONTH_COLUMN)
        .unwrap()
        .iter()
        .map(|c| c.to_text())
        .collect();
    assert_eq!(months, vec!["2025-01", "2025-02"]);
}

#[test]
fn at_store_db_12_cache_is_refreshed_per_namespace() {
    let h = Harness::new();
    let ba = h.store("ba");
    let pe = h.store("pe");
    let ba_ns = ba.namespace().clone();
    let pe_ns = pe.namespace().clone();

    assert!(ba.history().unwrap().is_empty());
    assert!(pe.history().unwrap().is_empty());
    assert!(h.cache.is_cached(&pe_ns, CachedTable::History));

    ba.upload("f.xlsx", &jan(&[("D1", "0.5")]), "admin", None)
        .unwrap();
    assert!(!h.cache.is_cached(&ba_ns, CachedTable::History));
    assert!(h.cache.is_cached(&pe_ns, CachedTable::History));
    assert_eq!(ba.history().unwrap().len(), 1);
    assert!(pe.history().unwrap().is_empty());
    assert!(pe.combined().table.is_empty());

    assert!(ba.layout().history_path().ends_with("ba_history.xlsx"));
    assert!(pe.layout().history_path().ends_with("pe_history.xlsx"));
}

#[test]
fn at_store_db_13_combined_format_follows_size() {
    let h = Harness::with_config(|c| c.with_table_limits(4, 100));
    let s = h.store("associates");
    let up = s
        .upload("jan.xlsx", &jan(&[("D1", "0.5"), ("D2", "0.6")]), "admin", None)
        .unwrap();
    assert_eq!(up.combined_format, TableFormat::Primary);
    let up = s
        .upload("feb.xlsx", &workbook(Some("2025-02"), &[("D1", "0.5"), ("D2", "0.6")]), "admin", None)
        .unwrap();
    assert_eq!(up.combined_format, TableFormat::Flat);
    let load = s.combined();
    assert_eq!(load.source, CombinedSource::Flat);
    assert_eq!(load.table.row_count(), 4);

    s.invalidate(&up.record.id, "admin").unwrap();
    assert_eq!(s.combined().source, CombinedSource::Primary);
}

#[test]
fn at_store_db_14_same_name_reupload_keeps_the_new_file() {
    let h = Harness::new();
    let s = h.store("associates");
    let first = s
        .upload("scores.xlsx", &jan(&[("D1", "0.5")]), "admin", None)
        .unwrap()
        .record;
    let second = s
        .upload("scores.xlsx", &jan(&[("D1", "0.9")]), "admin", None)
        .unwrap()
        .record;
    assert_eq!(first.saved_path, second.saved_path);
    assert!(second.saved_path.exists());
    assert!(!record(&s, &first.id).active);
}

#[test]
fn at_store_db_15_mixed_sequence_holds_invariants() {
    let h = Harness::new();
    let s = h.store("associates");
    let b1 = jan(&[("D1", "0.5")]);
    let a = s.upload("a.xlsx", &b1, "admin", None).unwrap().record;
    assert_store_invariants(&s);
    let b = s
        .upload("b.xlsx", &jan(&[("D2", "0.6")]), "admin", None)
        .unwrap()
        .record;
    assert_store_invariants(&s);
    s.invalidate(&b.id, "admin").unwrap();
    assert_store_invariants(&s);
    fs::write(&a.saved_path, &b1).unwrap();
    s.restore(&a.id, true, "admin").unwrap();
    assert_store_invariants(&s);
    let c = s
        .upload("c.xlsx", &jan(&[("D3", "0.7")]), "admin", None)
        .unwrap()
        .record;
    assert_store_invariants(&s);
    assert_eq!(s.latest_active().unwrap().unwrap().id, c.id);
    assert_eq!(
        s.history()
            .unwrap()
            .records()
            .iter()
            .filter(|r| r.active)
            .count(),
        1
    );
}

#[test]
fn at_store_db_16_export_uses_namespace_prefix() {
    let h = Harness::new();
    let s = h.store("ba");
    s.upload("a.xlsx", &jan(&[("D1", "0.5")]), "admin", None)
        .unwrap();
    let combined = s.combined().table.clone();
    let art = s.export_table(&combined, "combined_data", true).unwrap();
    assert_eq!(art.format, TableFormat::Primary);
    assert_eq!(art.file_name, "ba_combined_data.xlsx");
    assert!(!art.bytes.is_empty());
}

#[test]
fn at_store_db_17_invalidating_superseded_same_name_keeps_active_file() {
    let h = Harness::new();
    let s = h.store("associates");
    let first = s
        .upload("scores.xlsx", &jan(&[("D1", "0.5")]), "admin", None)
        .unwrap()
        .record;
    let second = s
        .upload("scores.xlsx", &jan(&[("D1", "0.9"), ("D2", "0.8")]), "admin", None)
        .unwrap()
        .record;

    s.invalidate(&first.id, "admin").unwrap();
    assert!(second.saved_path.exists());
    assert_eq!(combined_rows_for(&s, &first.id), 0);
    assert_eq!(combined_rows_for(&s, &second.id), 2);

    let out = s.restore(&second.id, true, "admin").unwrap();
    assert_eq!(out.rows_restored, 2);
    assert!(record(&s, &second.id).active);
    assert_store_invariants(&s);

    s.invalidate(&second.id, "admin").unwrap();
    assert!(!second.saved_path.exists());
}
