#![forbid(unsafe_code)]

pub mod naming;
pub mod percent;
pub mod period;
pub mod sheet;
