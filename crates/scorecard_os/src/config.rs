#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use scorecard_kernel_contracts::{ContractViolation, Validate};
use scorecard_storage::tabular::TableLimits;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 25;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub cache_ttl: Duration,
    pub table_limits: TableLimits,
}

impl StoreConfig {
    pub fn mvp_v1(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            table_limits: TableLimits::default(),
        }
    }

    /// `SCORECARD_DATA_DIR` (or `DISK_PATH`), `SCORECARD_MAX_UPLOAD_MB`,
    /// `SCORECARD_CACHE_TTL_SECS`. Unset variables take defaults; malformed ones fail.
    pub fn from_env() -> Result<Self, ContractViolation> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ContractViolation>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let data_dir = non_blank("SCORECARD_DATA_DIR")
            .or_else(|| non_blank("DISK_PATH"))
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let mut cfg = Self::mvp_v1(data_dir);

        if let Some(v) = non_blank("SCORECARD_MAX_UPLOAD_MB") {
            let mb = v.parse::<u64>().map_err(|_| ContractViolation::InvalidValue {
                field: "store_config.max_upload_mb",
                reason: "must be a whole number of megabytes",
            })?;
            cfg.max_upload_bytes = mb.saturating_mul(1024 * 1024);
        }
        if let Some(v) = non_blank("SCORECARD_CACHE_TTL_SECS") {
            let secs = v.parse::<u64>().map_err(|_| ContractViolation::InvalidValue {
                field: "store_config.cache_ttl_secs",
                reason: "must be a whole number of seconds",
            })?;
            cfg.cache_ttl = Duration::from_secs(secs);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_table_limits(mut self, max_rows: usize, max_cols: usize) -> Self {
        self.table_limits = TableLimits { max_rows, max_cols };
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }
}

impl Validate for StoreConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "store_config.data_dir",
                reason: "must not be empty",
            });
        }
        if self.max_upload_bytes == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "store_config.max_upload_bytes",
                reason: "must be > 0",
            });
        }
        if self.table_limits.max_rows < 2 || self.table_limits.max_cols < 1 {
            return Err(ContractViolation::InvalidValue {
                field: "store_config.table_limits",
                reason: "must allow a header and at least one row",
            });
        }
        Ok(())
    }
}
