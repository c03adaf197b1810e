#![forbid(unsafe_code)]

pub mod audit_log;
pub mod cache;
pub mod combined;
pub mod error;
pub mod feedback;
pub mod history;
pub mod layout;
pub mod tabular;

pub use error::StorageError;
