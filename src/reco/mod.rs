//! Combinatorial mass reconstruction.
//!
//! Responsibilities:
//!
//! - select and rank detected objects (`select`)
//! - classify events into decay channels (`channel`)
//! - enumerate role assignments for a hypothesis (`hypothesis`)
//! - score assignments by chi-squared (`chi2`)
//! - search the assignment space in parallel (`minimizer`)
//! - tie it together per event (`dispatch`)

pub mod channel;
pub mod chi2;
pub mod dispatch;
pub mod hypothesis;
pub mod minimizer;
pub mod select;

pub use channel::*;
pub use chi2::*;
pub use dispatch::*;
pub use hypothesis::*;
pub use minimizer::*;
pub use select::*;
