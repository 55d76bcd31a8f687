//! Shared domain types.
//!
//! Detected objects are immutable snapshots of one event entry. They are
//! `Copy` so that candidate pools can be handed to worker threads by value
//! without any shared state.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::FourMomentum;

/// Common kinematic view over every detected object.
pub trait Kinematic {
    fn p4(&self) -> FourMomentum;
    fn pt(&self) -> f64;
    fn eta(&self) -> f64;
}

/// A reconstructed jet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Jet {
    pub p4: FourMomentum,
    pub pt: f64,
    pub eta: f64,
    /// Likely originated from a bottom quark.
    pub tagged: bool,
}

impl Jet {
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, mass: f64, tagged: bool) -> Self {
        Self {
            p4: FourMomentum::from_pt_eta_phi_m(pt, eta, phi, mass),
            pt,
            eta,
            tagged,
        }
    }

    /// Wrap an explicit four-momentum; `pt`/`eta` are derived from it.
    pub fn from_p4(p4: FourMomentum, tagged: bool) -> Self {
        Self {
            p4,
            pt: p4.pt(),
            eta: p4.eta(),
            tagged,
        }
    }
}

impl Kinematic for Jet {
    fn p4(&self) -> FourMomentum {
        self.p4
    }
    fn pt(&self) -> f64 {
        self.pt
    }
    fn eta(&self) -> f64 {
        self.eta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeptonFlavor {
    Electron,
    Muon,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lepton {
    pub p4: FourMomentum,
    pub pt: f64,
    pub eta: f64,
    pub flavor: LeptonFlavor,
}

impl Lepton {
    pub fn from_pt_eta_phi_m(flavor: LeptonFlavor, pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        Self {
            p4: FourMomentum::from_pt_eta_phi_m(pt, eta, phi, mass),
            pt,
            eta,
            flavor,
        }
    }

    pub fn from_p4(flavor: LeptonFlavor, p4: FourMomentum) -> Self {
        Self {
            p4,
            pt: p4.pt(),
            eta: p4.eta(),
            flavor,
        }
    }
}

impl Kinematic for Lepton {
    fn p4(&self) -> FourMomentum {
        self.p4
    }
    fn pt(&self) -> f64 {
        self.pt
    }
    fn eta(&self) -> f64 {
        self.eta
    }
}

/// Transverse momentum imbalance, used as a massless neutrino proxy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MissingEnergy {
    pub p4: FourMomentum,
    pub met: f64,
    pub phi: f64,
}

impl MissingEnergy {
    pub fn new(met: f64, eta: f64, phi: f64) -> Self {
        Self {
            p4: FourMomentum::from_pt_eta_phi_m(met, eta, phi, 0.0),
            met,
            phi,
        }
    }

    pub fn from_p4(p4: FourMomentum) -> Self {
        Self {
            p4,
            met: p4.pt(),
            phi: p4.phi(),
        }
    }
}

/// One collision event as delivered by an event source.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub entry: usize,
    pub jets: Vec<Jet>,
    pub electrons: Vec<Lepton>,
    pub muons: Vec<Lepton>,
    pub missing: MissingEnergy,
}

impl Event {
    /// Electrons first, then muons.
    pub fn leptons(&self) -> Vec<Lepton> {
        self.electrons.iter().chain(self.muons.iter()).copied().collect()
    }
}

/// The four object counts that drive channel classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Multiplicities {
    pub leptons: usize,
    pub selected_jets: usize,
    pub untagged_jets: usize,
    pub tagged_jets: usize,
}

/// Decay channel of an event, derived from its multiplicities only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecayChannel {
    InsufficientObjects,
    FullHadronic,
    AmbiguousHadronicOrSemiLeptonic,
    SemiLeptonic,
    MultiLeptonAllHadronicCapable,
    MultiLeptonSemiLeptonicCapable,
    FullLeptonic,
    Unclassified,
}

impl DecayChannel {
    pub const ALL: [DecayChannel; 8] = [
        DecayChannel::InsufficientObjects,
        DecayChannel::FullHadronic,
        DecayChannel::AmbiguousHadronicOrSemiLeptonic,
        DecayChannel::SemiLeptonic,
        DecayChannel::MultiLeptonAllHadronicCapable,
        DecayChannel::MultiLeptonSemiLeptonicCapable,
        DecayChannel::FullLeptonic,
        DecayChannel::Unclassified,
    ];

    /// Legacy integer code (0–7) used in exported tables.
    pub fn code(self) -> u8 {
        match self {
            DecayChannel::InsufficientObjects => 0,
            DecayChannel::FullHadronic => 1,
            DecayChannel::AmbiguousHadronicOrSemiLeptonic => 2,
            DecayChannel::SemiLeptonic => 3,
            DecayChannel::MultiLeptonAllHadronicCapable => 4,
            DecayChannel::MultiLeptonSemiLeptonicCapable => 5,
            DecayChannel::FullLeptonic => 6,
            DecayChannel::Unclassified => 7,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            DecayChannel::InsufficientObjects => "insufficient objects",
            DecayChannel::FullHadronic => "full hadronic",
            DecayChannel::AmbiguousHadronicOrSemiLeptonic => "hadronic/semi-leptonic (ambiguous)",
            DecayChannel::SemiLeptonic => "semi-leptonic",
            DecayChannel::MultiLeptonAllHadronicCapable => "multi-lepton, all-hadronic capable",
            DecayChannel::MultiLeptonSemiLeptonicCapable => "multi-lepton, semi-leptonic capable",
            DecayChannel::FullLeptonic => "full leptonic",
            DecayChannel::Unclassified => "unclassified",
        }
    }
}

/// Expected masses and resolutions entering the chi-squared score (GeV).
///
/// The exotic term has its own weight so it can be switched on without
/// touching the W/top terms; it is off by default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassHypothesis {
    pub w_mass: f64,
    pub w_sigma: f64,
    pub top_mass: f64,
    pub top_sigma: f64,
    pub exotic_mass: f64,
    pub exotic_sigma: f64,
    pub exotic_weight: f64,
}

impl Default for MassHypothesis {
    fn default() -> Self {
        Self {
            w_mass: 81.3,
            w_sigma: 17.07,
            top_mass: 172.6,
            top_sigma: 36.91,
            exotic_mass: 100.0,
            exotic_sigma: 21.46,
            exotic_weight: 0.0,
        }
    }
}

/// Fixed binning of one output histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    pub bins: usize,
    pub lo: f64,
    pub hi: f64,
}

impl Binning {
    pub const fn new(bins: usize, lo: f64, hi: f64) -> Self {
        Self { bins, lo, hi }
    }
}

/// Object selection cuts and gates applied before any reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionCuts {
    pub jet_pt_min: f64,
    pub jet_eta_max: f64,
    /// Events with fewer selected jets are skipped before classification.
    pub min_selected_jets: usize,
    pub min_tagged_jets: usize,
    pub max_tagged_jets: usize,
}

impl Default for SelectionCuts {
    fn default() -> Self {
        Self {
            jet_pt_min: 25.0,
            jet_eta_max: 2.5,
            min_selected_jets: 6,
            min_tagged_jets: 2,
            max_tagged_jets: 4,
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags and `RECO_*` environment variables.
#[derive(Debug, Clone)]
pub struct RecoConfig {
    pub input: PathBuf,
    pub first_entry: usize,
    /// Exclusive; `None` means all entries.
    pub last_entry: Option<usize>,

    pub cuts: SelectionCuts,
    pub masses: MassHypothesis,
    pub workers: usize,

    pub output: PathBuf,
    pub export_events: Option<PathBuf>,

    pub w_binning: Binning,
    pub top_binning: Binning,
    pub exotic_binning: Binning,
}

impl RecoConfig {
    pub const DEFAULT_W_BINNING: Binning = Binning::new(80, 0.0, 200.0);
    pub const DEFAULT_TOP_BINNING: Binning = Binning::new(80, 0.0, 400.0);
    pub const DEFAULT_EXOTIC_BINNING: Binning = Binning::new(120, 0.0, 600.0);

    pub fn with_input(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            first_entry: 0,
            last_entry: None,
            cuts: SelectionCuts::default(),
            masses: MassHypothesis::default(),
            workers: 4,
            output: PathBuf::from("reco_histograms.json"),
            export_events: None,
            w_binning: Self::DEFAULT_W_BINNING,
            top_binning: Self::DEFAULT_TOP_BINNING,
            exotic_binning: Self::DEFAULT_EXOTIC_BINNING,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let cuts = &self.cuts;
        if !(cuts.jet_pt_min.is_finite() && cuts.jet_pt_min >= 0.0) {
            return Err(AppError::input(format!("Invalid jet pT cut: {}", cuts.jet_pt_min)));
        }
        if !(cuts.jet_eta_max.is_finite() && cuts.jet_eta_max > 0.0) {
            return Err(AppError::input(format!("Invalid jet |eta| cut: {}", cuts.jet_eta_max)));
        }
        if cuts.min_tagged_jets > cuts.max_tagged_jets {
            return Err(AppError::input(format!(
                "Invalid tagged-jet window: [{}, {}]",
                cuts.min_tagged_jets, cuts.max_tagged_jets
            )));
        }
        if self.workers == 0 {
            return Err(AppError::input("Worker count must be >= 1."));
        }
        if let Some(last) = self.last_entry {
            if last < self.first_entry {
                return Err(AppError::input(format!(
                    "Invalid entry range: first={} last={last}",
                    self.first_entry
                )));
            }
        }

        let m = &self.masses;
        for (name, sigma) in [("w", m.w_sigma), ("top", m.top_sigma), ("exotic", m.exotic_sigma)] {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(AppError::input(format!("Invalid {name} sigma: {sigma}")));
            }
        }
        if !(m.exotic_weight.is_finite() && m.exotic_weight >= 0.0) {
            return Err(AppError::input(format!("Invalid exotic weight: {}", m.exotic_weight)));
        }

        for (name, b) in [
            ("w", self.w_binning),
            ("top", self.top_binning),
            ("exotic", self.exotic_binning),
        ] {
            if b.bins == 0 || !(b.lo.is_finite() && b.hi.is_finite() && b.hi > b.lo) {
                return Err(AppError::input(format!(
                    "Invalid {name} histogram binning: {} bins over [{}, {}]",
                    b.bins, b.lo, b.hi
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leptons_are_electrons_then_muons() {
        let e = Lepton::from_pt_eta_phi_m(LeptonFlavor::Electron, 30.0, 0.1, 0.0, 0.0);
        let mu = Lepton::from_pt_eta_phi_m(LeptonFlavor::Muon, 50.0, 0.2, 1.0, 0.0);
        let event = Event {
            entry: 0,
            jets: Vec::new(),
            electrons: vec![e],
            muons: vec![mu],
            missing: MissingEnergy::new(20.0, 0.0, 0.0),
        };
        let leptons = event.leptons();
        assert_eq!(leptons[0].flavor, LeptonFlavor::Electron);
        assert_eq!(leptons[1].flavor, LeptonFlavor::Muon);
    }

    #[test]
    fn channel_codes_are_distinct_and_ordered() {
        let codes: Vec<u8> = DecayChannel::ALL.iter().map(|c| c.code()).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn default_config_validates() {
        RecoConfig::with_input("events.csv").validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_workers_and_inverted_tag_window() {
        let mut config = RecoConfig::with_input("events.csv");
        config.workers = 0;
        assert_eq!(config.validate().unwrap_err().exit_code(), 2);

        let mut config = RecoConfig::with_input("events.csv");
        config.cuts.min_tagged_jets = 5;
        assert!(config.validate().is_err());

        let mut config = RecoConfig::with_input("events.csv");
        config.masses.top_sigma = 0.0;
        assert!(config.validate().is_err());
    }
}
