#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::{ContractViolation, Validate};

/// Normalized (year, month) key an attachment's data belongs to. Renders as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReportingPeriod {
    year: i32,
    month: u32,
}

impl ReportingPeriod {
    pub fn v1(year: i32, month: u32) -> Result<Self, ContractViolation> {
        let p = Self { year, month };
        p.validate()?;
        Ok(p)
    }

    pub fn from_date<D: Datelike>(date: &D) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl Validate for ReportingPeriod {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !(1..=9999).contains(&self.year) {
            return Err(ContractViolation::InvalidRange {
                field: "reporting_period.year",
                min: 1.0,
                max: 9999.0,
                got: self.year as f64,
            });
        }
        if !(1..=12).contains(&self.month) {
            return Err(ContractViolation::InvalidRange {
                field: "reporting_period.month",
                min: 1.0,
                max: 12.0,
                got: self.month as f64,
            });
        }
        Ok(())
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for ReportingPeriod {
    type Err = ContractViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ContractViolation::InvalidValue {
            field: "reporting_period",
            reason: "must be formatted YYYY-MM",
        };
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::v1(year, month)
    }
}
