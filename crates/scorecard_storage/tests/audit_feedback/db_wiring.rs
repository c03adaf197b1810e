#![forbid(unsafe_code)]

use std::fs;

use chrono::{NaiveDate, NaiveDateTime};
use scorecard_kernel_contracts::attachment::AttachmentId;
use scorecard_kernel_contracts::audit::{AuditAction, AuditEntry};
use scorecard_kernel_contracts::feedback::FeedbackEntry;
use scorecard_kernel_contracts::period::ReportingPeriod;
use scorecard_storage::audit_log::AuditLog;
use scorecard_storage::feedback::FeedbackStore;

fn ts(m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 2, 1)
        .unwrap()
        .and_hms_opt(10, m, 0)
        .unwrap()
}

fn feedback(domain: &str, month: u32, text: &str, at: NaiveDateTime) -> FeedbackEntry {
    FeedbackEntry::v1(
        domain.to_string(),
        "Ana".to_string(),
        ReportingPeriod::v1(2025, month).unwrap(),
        "Lead".to_string(),
        text.to_string(),
        at,
        "tl_user".to_string(),
    )
    .unwrap()
}

#[test]
fn at_audit_db_01_entries_append_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let log = AuditLog::new(dir.path().join("audit_log.xlsx"));
    let id = AttachmentId::new("att-1").unwrap();
    for (m, action) in [(1, AuditAction::Upload), (2, AuditAction::InvalidationCleanup)] {
        let e = AuditEntry::v1(ts(m), action, &id, "f.xlsx".into(), "admin".into()).unwrap();
        log.append(&e).unwrap();
    }
    let entries = log.entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, "Upload");
    assert_eq!(entries[1].action, "Invalidation & Cleanup");
    assert_eq!(entries[1].timestamp, ts(2));
    assert_eq!(entries[1].attachment_id, "att-1");
}

#[test]
fn at_audit_db_02_corrupt_log_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit_log.xlsx");
    fs::write(&path, b"junk").unwrap();
    assert!(AuditLog::new(path).entries().is_err());
}

#[test]
fn at_fb_db_01_upsert_replaces_same_key_only() {
    let dir = tempfile::tempdir().unwrap();
    let store = FeedbackStore::new(dir.path().join("monthly_feedback.xlsx"));
    store.upsert(&feedback("D1", 1, "first", ts(1))).unwrap();
    store.upsert(&feedback("D1", 2, "february", ts(2))).unwrap();
    store.upsert(&feedback("D1", 1, "second", ts(3))).unwrap();

    assert_eq!(store.entries().len(), 2);
    let latest = store.latest_for("D1", "2025-01").unwrap();
    assert_eq!(latest.feedback, "second");
    assert_eq!(latest.entered_by, "tl_user");
    assert_eq!(store.latest_for("D1", "2025-02").unwrap().feedback, "february");
    assert!(store.latest_for("D2", "2025-01").is_none());
}

#[test]
fn at_fb_db_02_duplicate_rows_resolve_to_latest_timestamp() {
    let entries = vec![
        feedback("D1", 1, "newest", ts(9)),
        feedback("D1", 1, "older", ts(4)),
        feedback("D1", 1, "tie-later-row", ts(9)),
    ];
    let latest =
        scorecard_storage::feedback::latest_by_key(entries, "D1", "2025-01").unwrap();
    assert_eq!(latest.feedback, "tie-later-row");
}

#[test]
fn at_fb_db_03_unreadable_file_reads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monthly_feedback.xlsx");
    fs::write(&path, b"junk").unwrap();
    let store = FeedbackStore::new(path);
    assert!(store.entries().is_empty());
    store.upsert(&feedback("D1", 1, "fresh", ts(1))).unwrap();
    assert_eq!(store.latest_for("D1", "2025-01").unwrap().feedback, "fresh");
}
