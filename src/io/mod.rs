//! Input/output helpers.
//!
//! - CSV event files (`events`)
//! - histogram JSON read/write (`histograms`)
//! - per-event CSV export (`export`)

pub mod events;
pub mod export;
pub mod histograms;

pub use events::*;
pub use export::*;
pub use histograms::*;
