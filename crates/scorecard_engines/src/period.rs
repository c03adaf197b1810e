#![forbid(unsafe_code)]

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use scorecard_kernel_contracts::period::ReportingPeriod;
use scorecard_kernel_contracts::table::{CellValue, Table};

/// Columns consulted, in order, when resolving an upload's reporting period.
pub const PERIOD_SOURCE_COLUMNS: [&str; 2] = ["Month", "Date"];

/// Columns consulted, in order, when normalizing row months for views.
pub const MONTH_KEY_COLUMNS: [&str; 4] = ["Month", "Reporting Month", "Report Month", "Date"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Spreadsheet serial day number (1900 date system) to a timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

/// Renders a timestamp the way date cells are stored in tables: date only at midnight.
pub fn datetime_to_cell_text(dt: NaiveDateTime) -> String {
    if dt.time() == chrono::NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Date carried by a cell. Only text cells are interpreted; bare numbers are
/// not dates here because the workbook reader already surfaces typed date cells as text.
pub fn parse_cell_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Text(raw) => parse_date_text(raw),
        _ => None,
    }
}

fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    // Month-only forms: `2025-01`, `2025/01`, `January 2025`, `Jan 2025`, `Jan-2025`.
    for (candidate, fmt) in [
        (format!("{s}-01"), "%Y-%m-%d"),
        (format!("{s}/01"), "%Y/%m/%d"),
        (format!("1 {s}"), "%d %B %Y"),
        (format!("1 {s}"), "%d %b %Y"),
        (format!("1 {}", s.replace('-', " ")), "%d %b %Y"),
    ] {
        if let Ok(d) = NaiveDate::parse_from_str(&candidate, fmt) {
            return Some(d);
        }
    }
    None
}

/// First date in `Month`, then `Date`, that forms a valid period; otherwise
/// the period of `now`.
pub fn derive_reporting_period(table: &Table, now: NaiveDateTime) -> ReportingPeriod {
    for column in PERIOD_SOURCE_COLUMNS {
        let Some(values) = table.column_values(column) else {
            continue;
        };
        let found = values.into_iter().find_map(|cell| {
            let d = parse_cell_date(cell)?;
            ReportingPeriod::v1(d.year(), d.month()).ok()
        });
        if let Some(period) = found {
            return period;
        }
    }
    ReportingPeriod::from_date(&now.date())
}

/// Per-row `YYYY-MM` keys from the first month-like column present. When no
/// value in that column parses as a date the trimmed raw text is used instead.
/// `None` when the table has no month-like column.
pub fn month_keys(table: &Table) -> Option<Vec<String>> {
    let column = MONTH_KEY_COLUMNS
        .iter()
        .find(|c| table.column_index(c).is_some())?;
    let values = table.column_values(column)?;
    let parsed: Vec<Option<NaiveDate>> = values.iter().map(|c| parse_cell_date(c)).collect();
    if parsed.iter().all(Option::is_none) {
        return Some(values.iter().map(|c| c.to_text().trim().to_string()).collect());
    }
    Some(
        parsed
            .into_iter()
            .map(|d| {
                d.map(|d| ReportingPeriod::from_date(&d).to_string())
                    .unwrap_or_default()
            })
            .collect(),
    )
}
