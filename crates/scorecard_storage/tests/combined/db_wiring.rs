#![forbid(unsafe_code)]

use std::fs;

use scorecard_kernel_contracts::attachment::AttachmentId;
use scorecard_kernel_contracts::namespace::NamespaceId;
use scorecard_kernel_contracts::table::{CellValue, Table};
use scorecard_storage::combined::{CombinedSource, CombinedStore, ATTACHMENT_ID_COLUMN};
use scorecard_storage::layout::NamespaceLayout;
use scorecard_storage::tabular::{TableFormat, TableLimits};

fn rows(prefix: &str, n: usize) -> Table {
    let mut t = Table::with_columns(&["Domain ID", "Final Score"]);
    for i in 0..n {
        t.push_row(vec![
            CellValue::text(format!("{prefix}{i}")),
            CellValue::text("97%"),
        ])
        .unwrap();
    }
    t
}

fn id(s: &str) -> AttachmentId {
    AttachmentId::new(s).unwrap()
}

fn store(dir: &tempfile::TempDir, limits: TableLimits) -> CombinedStore {
    let layout = NamespaceLayout::new(dir.path(), NamespaceId::associates());
    CombinedStore::for_layout(&layout, limits)
}

#[test]
fn at_comb_db_01_missing_files_load_empty() {
    let dir = tempfile::tempdir().unwrap();
    let load = store(&dir, TableLimits::default()).load();
    assert_eq!(load.source, CombinedSource::Empty);
    assert_eq!(load.table.columns(), &[ATTACHMENT_ID_COLUMN]);
}

#[test]
fn at_comb_db_02_replace_is_scoped_to_one_attachment() {
    let dir = tempfile::tempdir().unwrap();
    let s = store(&dir, TableLimits::default());
    s.replace_rows_for(&id("a"), &rows("A", 2)).unwrap();
    s.replace_rows_for(&id("b"), &rows("B", 3)).unwrap();
    assert_eq!(s.replace_rows_for(&id("a"), &rows("A", 1)).unwrap(), TableFormat::Primary);

    let load = s.load();
    assert_eq!(load.source, CombinedSource::Primary);
    assert_eq!(load.table.row_count(), 4);
    assert_eq!(s.rows_for(&id("a")).row_count(), 1);
    assert_eq!(s.rows_for(&id("b")).row_count(), 3);

    assert_eq!(s.remove_rows_for(&id("b")).unwrap(), 3);
    assert!(s.rows_for(&id("b")).is_empty());
    assert_eq!(s.remove_rows_for(&id("b")).unwrap(), 0);
}

#[test]
fn at_comb_db_03_format_follows_size_both_ways() {
    let dir = tempfile::tempdir().unwrap();
    let limits = TableLimits {
        max_rows: 4,
        max_cols: 10,
    };
    let s = store(&dir, limits);
    assert_eq!(s.replace_rows_for(&id("a"), &rows("A", 2)).unwrap(), TableFormat::Primary);
    assert_eq!(s.replace_rows_for(&id("b"), &rows("B", 2)).unwrap(), TableFormat::Flat);
    assert!(!s.primary_path().exists());
    assert_eq!(s.current_format(), Some(TableFormat::Flat));
    let load = s.load();
    assert_eq!(load.source, CombinedSource::Flat);
    assert_eq!(load.table.row_count(), 4);

    s.remove_rows_for(&id("b")).unwrap();
    assert_eq!(s.current_format(), Some(TableFormat::Primary));
    assert!(!s.flat_path().exists());
    assert_eq!(s.load().table.row_count(), 2);
}

#[test]
fn at_comb_db_04_corrupt_files_degrade_to_recovered_empty() {
    let dir = tempfile::tempdir().unwrap();
    let s = store(&dir, TableLimits::default());
    fs::write(s.primary_path(), b"not a workbook").unwrap();
    let load = s.load();
    assert_eq!(load.source, CombinedSource::RecoveredEmpty);
    assert!(load.table.is_empty());
}

#[test]
fn at_comb_db_05_unreadable_primary_falls_back_to_flat() {
    let dir = tempfile::tempdir().unwrap();
    let s = store(&dir, TableLimits::default());
    fs::write(s.flat_path(), "Domain ID,Attachment ID\nD1,a\n").unwrap();
    fs::write(s.primary_path(), b"garbage").unwrap();
    let load = s.load();
    assert_eq!(load.source, CombinedSource::Flat);
    assert_eq!(s.rows_for(&id("a")).row_count(), 1);
}
