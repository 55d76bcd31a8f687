//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - detected objects (`Jet`, `Lepton`, `MissingEnergy`) and the `Event` they belong to
//! - the closed `DecayChannel` classification
//! - run configuration (`RecoConfig`, `SelectionCuts`, `MassHypothesis`, `Binning`)

pub mod types;

pub use types::*;
