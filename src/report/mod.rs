//! Reporting utilities: run summaries and significance tables.

pub mod format;

pub use format::*;
