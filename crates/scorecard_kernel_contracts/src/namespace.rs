#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ContractViolation, Validate};

pub const NAMESPACE_MAX_LEN: usize = 32;

/// Legacy namespace whose files carry no prefix on disk.
pub const ASSOCIATES: &str = "associates";

pub const BUILTIN_NAMESPACES: [&str; 5] = [ASSOCIATES, "ba", "pe", "tl", "pl"];

/// Organizational role that owns an isolated set of attachment tables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NamespaceId(String);

impl NamespaceId {
    pub fn new(slug: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = Self(slug.into().trim().to_ascii_lowercase());
        id.validate()?;
        Ok(id)
    }

    pub fn associates() -> Self {
        Self(ASSOCIATES.to_string())
    }

    pub fn builtin() -> Vec<Self> {
        BUILTIN_NAMESPACES
            .iter()
            .map(|slug| Self((*slug).to_string()))
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_legacy(&self) -> bool {
        self.0 == ASSOCIATES
    }
}

impl Validate for NamespaceId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.is_empty() || self.0.len() > NAMESPACE_MAX_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "namespace_id",
                reason: "must be 1..=32 chars",
            });
        }
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ContractViolation::InvalidValue {
                field: "namespace_id",
                reason: "must contain only [a-z0-9_]",
            });
        }
        Ok(())
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
