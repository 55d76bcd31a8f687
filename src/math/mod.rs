//! Mathematical utilities: four-momentum algebra and weighted least squares.

pub mod lorentz;
pub mod ols;

pub use lorentz::*;
pub use ols::*;
