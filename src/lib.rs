//! `mass-reco` library crate.
//!
//! Reconstructs W boson, top quark and exotic-particle masses from
//! detector-level jets, leptons and missing energy by brute-force assignment
//! of objects to decay roles, scored by chi-squared and searched in parallel.
//!
//! The binary (`reco`) is a thin wrapper around this library so that the
//! reconstruction core stays testable without spawning processes.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod hist;
pub mod io;
pub mod math;
pub mod reco;
pub mod report;
