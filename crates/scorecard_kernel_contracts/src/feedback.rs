#![forbid(unsafe_code)]

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::common::{validate_len, validate_text};
use crate::period::ReportingPeriod;
use crate::{ContractViolation, Validate};

pub const FEEDBACK_COLUMNS: [&str; 7] = [
    "Domain ID",
    "Name",
    "Month",
    "Team Lead",
    "Feedback",
    "timestamp",
    "entered_by",
];

pub const MAX_FEEDBACK_CHARS: usize = 500;

/// Monthly feedback row keyed by (`domain_id`, `month`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub domain_id: String,
    pub name: String,
    pub month: String,
    pub team_lead: String,
    pub feedback: String,
    pub timestamp: NaiveDateTime,
    pub entered_by: String,
}

impl FeedbackEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        domain_id: String,
        name: String,
        period: ReportingPeriod,
        team_lead: String,
        feedback: String,
        timestamp: NaiveDateTime,
        entered_by: String,
    ) -> Result<Self, ContractViolation> {
        let e = Self {
            domain_id: domain_id.trim().to_string(),
            name,
            month: period.to_string(),
            team_lead,
            feedback,
            timestamp,
            entered_by,
        };
        e.validate()?;
        Ok(e)
    }

    pub fn matches_key(&self, domain_id: &str, month: &str) -> bool {
        self.domain_id.trim() == domain_id.trim() && self.month.trim() == month.trim()
    }
}

impl Validate for FeedbackEntry {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("feedback_entry.domain_id", &self.domain_id, 64)?;
        validate_text("feedback_entry.month", &self.month, 32)?;
        validate_text("feedback_entry.entered_by", &self.entered_by, 96)?;
        validate_len("feedback_entry.name", &self.name, 128)?;
        validate_len("feedback_entry.team_lead", &self.team_lead, 128)?;
        validate_len("feedback_entry.feedback", &self.feedback, MAX_FEEDBACK_CHARS)?;
        Ok(())
    }
}
