#![forbid(unsafe_code)]

pub mod attachment;
pub mod audit;
pub mod common;
pub mod feedback;
pub mod namespace;
pub mod period;
pub mod table;

pub use common::{ContractViolation, SchemaVersion, Validate};
