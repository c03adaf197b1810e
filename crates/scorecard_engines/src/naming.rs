#![forbid(unsafe_code)]

use scorecard_kernel_contracts::period::ReportingPeriod;

/// File name an upload's original bytes are kept under: `{period}_{name}`,
/// with path separators flattened so the name cannot escape its directory.
pub fn derive_saved_file_name(period: ReportingPeriod, original_name: &str) -> String {
    let base = original_name.trim();
    let base = if base.is_empty() { "upload.xlsx" } else { base };
    let sanitized: String = base
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let sanitized = if sanitized.chars().all(|c| c == '.') {
        sanitized.replace('.', "_")
    } else {
        sanitized
    };
    format!("{period}_{sanitized}")
}
