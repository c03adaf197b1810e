#![forbid(unsafe_code)]

use rust_decimal::prelude::{Decimal, FromPrimitive};
use scorecard_kernel_contracts::table::{CellValue, Table};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentNormalizerConfig {
    /// Substrings that mark a column as percentage-bearing.
    pub keywords: &'static [&'static str],
    /// Single-letter code suffixes (`_t` target, `_a` actual, `_r` rating).
    pub code_suffixes: &'static [&'static str],
    /// Bare numbers at or below this are fractions (`0.97` -> `97%`).
    pub fraction_ceiling: f64,
    pub companion_suffix: &'static str,
    pub decimal_places: u32,
}

impl PercentNormalizerConfig {
    pub fn mvp_v1() -> Self {
        Self {
            keywords: &["target", "actual", "rating", "final score"],
            code_suffixes: &["_t", "_a", "_r"],
            fraction_ceiling: 1.5,
            companion_suffix: "_num",
            decimal_places: 2,
        }
    }
}

/// Canonicalizes percentage-like columns to `"<n>%"` strings and derives
/// numeric `<col>_num` companions. Re-running on its own output is a no-op.
#[derive(Debug, Clone)]
pub struct PercentNormalizer {
    config: PercentNormalizerConfig,
}

impl Default for PercentNormalizer {
    fn default() -> Self {
        Self::new(PercentNormalizerConfig::mvp_v1())
    }
}

impl PercentNormalizer {
    pub fn new(config: PercentNormalizerConfig) -> Self {
        Self { config }
    }

    pub fn is_percent_column(&self, name: &str) -> bool {
        let n = name.trim().to_lowercase();
        if n.ends_with(self.config.companion_suffix) {
            return false;
        }
        self.config.keywords.iter().any(|k| n.contains(k))
            || self.config.code_suffixes.iter().any(|s| n.ends_with(s))
    }

    pub fn companion_name(&self, column: &str) -> String {
        format!("{column}{}", self.config.companion_suffix)
    }

    /// Display form of one cell. Values that do not parse pass through unchanged.
    pub fn to_display(&self, cell: &CellValue) -> CellValue {
        match cell {
            CellValue::Number(v) if v.is_finite() => {
                CellValue::Text(self.format_percent(self.scale_bare(*v)))
            }
            CellValue::Text(raw) => match parse_percent_text(raw) {
                Some(PercentText::Suffixed(v)) => CellValue::Text(self.format_percent(v)),
                Some(PercentText::Bare(v)) => {
                    CellValue::Text(self.format_percent(self.scale_bare(v)))
                }
                None => cell.clone(),
            },
            _ => cell.clone(),
        }
    }

    /// Numeric value in percentage units. `%`-suffixed text is already in
    /// percentage units; bare numbers go through the fraction heuristic.
    pub fn to_numeric(&self, cell: &CellValue) -> Option<f64> {
        match cell {
            CellValue::Number(v) if v.is_finite() => Some(self.scale_bare(*v)),
            CellValue::Text(raw) => match parse_percent_text(raw)? {
                PercentText::Suffixed(v) => Some(v),
                PercentText::Bare(v) => Some(self.scale_bare(v)),
            },
            _ => None,
        }
    }

    pub fn normalize(&self, table: &Table) -> Table {
        let mut out = table.clone();
        let percent_columns: Vec<(usize, String)> = out
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| self.is_percent_column(name))
            .map(|(idx, name)| (idx, name.clone()))
            .collect();

        for (idx, name) in percent_columns {
            out.map_column(idx, |cell| self.to_display(cell));
            let numeric: Vec<Option<f64>> = out
                .rows()
                .iter()
                .map(|row| self.to_numeric(&row[idx]))
                .collect();
            if numeric.iter().all(Option::is_none) {
                continue;
            }
            let values = numeric
                .into_iter()
                .map(|v| v.map(CellValue::Number).unwrap_or(CellValue::Empty))
                .collect();
            // Lengths match by construction.
            let _ = out.set_column_values(&self.companion_name(&name), values);
        }
        out
    }

    fn scale_bare(&self, v: f64) -> f64 {
        if v <= self.config.fraction_ceiling {
            v * 100.0
        } else {
            v
        }
    }

    fn format_percent(&self, v: f64) -> String {
        let places = self.config.decimal_places;
        match Decimal::from_f64(v) {
            Some(d) => format!("{}%", d.round_dp(places).normalize()),
            None => {
                let scale = 10f64.powi(places as i32);
                format!("{}%", (v * scale).round() / scale)
            }
        }
    }
}

enum PercentText {
    Suffixed(f64),
    Bare(f64),
}

fn parse_percent_text(raw: &str) -> Option<PercentText> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let (body, suffixed) = match cleaned.strip_suffix('%') {
        Some(body) => (body, true),
        None => (cleaned.as_str(), false),
    };
    let v = body.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(if suffixed {
        PercentText::Suffixed(v)
    } else {
        PercentText::Bare(v)
    })
}
