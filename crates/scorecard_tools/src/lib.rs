#![forbid(unsafe_code)]

pub mod store_cli;
