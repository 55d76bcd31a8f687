//! Output histograms and peak significance.
//!
//! - fixed-bin histograms that act as mass sinks (`histogram`)
//! - Gaussian fit + sideband S/√B on a finished histogram (`significance`)

pub mod histogram;
pub mod significance;

pub use histogram::*;
pub use significance::*;
