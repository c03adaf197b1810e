#![forbid(unsafe_code)]

pub mod attachment_store;
pub mod clock;
pub mod config;
pub mod views;

pub use attachment_store::{AttachmentError, AttachmentVersionStore};
pub use config::StoreConfig;
