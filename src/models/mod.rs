//! Data models

pub mod anomaly;
pub mod log_entry;

pub use anomaly::*;
pub use log_entry::*;
