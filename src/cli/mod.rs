//! Command-line parsing for the `reco` binary.
//!
//! Argument parsing and command dispatch stay separate from the
//! reconstruction code. Every `run` flag can also be set through a `RECO_*`
//! environment variable (a `.env` file is loaded first).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::data::SampleConfig;
use crate::domain::{Binning, MassHypothesis, RecoConfig, SelectionCuts};
use crate::hist::DEFAULT_WINDOW_WIDTH;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "reco", version, about = "Combinatorial W / top / exotic mass reconstruction")]
pub struct Cli {
    /// Log filter used when `RUST_LOG` is not set (error, warn, info, debug, trace).
    #[arg(long, global = true, env = "RECO_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reconstruct an event file and write W/top/exotic mass histograms.
    Run(RunArgs),
    /// Fit the peaks of a saved histogram file and print S/sqrt(B).
    Significance(SignificanceArgs),
    /// Write a synthetic top-pair event file.
    Generate(GenerateArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Event CSV (`event,kind,pt,eta,phi,mass,btag`).
    #[arg(env = "RECO_INPUT", value_name = "CSV")]
    pub input: PathBuf,

    /// First entry to process.
    #[arg(long, env = "RECO_FIRST_ENTRY", default_value_t = 0)]
    pub first_entry: usize,

    /// One past the last entry to process (default: all).
    #[arg(long, env = "RECO_LAST_ENTRY")]
    pub last_entry: Option<usize>,

    /// Parallel workers for the candidate search.
    #[arg(short = 'j', long, env = "RECO_WORKERS", default_value_t = crate::reco::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Minimum jet pT (GeV).
    #[arg(long, env = "RECO_JET_PT_MIN", default_value_t = 25.0)]
    pub jet_pt_min: f64,

    /// Maximum jet |eta|.
    #[arg(long, env = "RECO_JET_ETA_MAX", default_value_t = 2.5)]
    pub jet_eta_max: f64,

    /// Minimum number of selected jets.
    #[arg(long, env = "RECO_MIN_JETS", default_value_t = 6)]
    pub min_jets: usize,

    /// Minimum number of tagged jets.
    #[arg(long, env = "RECO_MIN_TAGGED", default_value_t = 2)]
    pub min_tagged: usize,

    /// Maximum number of tagged jets.
    #[arg(long, env = "RECO_MAX_TAGGED", default_value_t = 4)]
    pub max_tagged: usize,

    #[arg(long, env = "RECO_W_MASS", default_value_t = 81.3)]
    pub w_mass: f64,

    #[arg(long, env = "RECO_W_SIGMA", default_value_t = 17.07)]
    pub w_sigma: f64,

    #[arg(long, env = "RECO_TOP_MASS", default_value_t = 172.6)]
    pub top_mass: f64,

    #[arg(long, env = "RECO_TOP_SIGMA", default_value_t = 36.91)]
    pub top_sigma: f64,

    #[arg(long, env = "RECO_EXOTIC_MASS", default_value_t = 100.0)]
    pub exotic_mass: f64,

    #[arg(long, env = "RECO_EXOTIC_SIGMA", default_value_t = 21.46)]
    pub exotic_sigma: f64,

    /// Weight of the exotic term in chi2 (0 disables it).
    #[arg(long, env = "RECO_EXOTIC_WEIGHT", default_value_t = 0.0)]
    pub exotic_weight: f64,

    /// Histogram JSON output.
    #[arg(short, long, env = "RECO_OUTPUT", default_value = "reco_histograms.json")]
    pub output: PathBuf,

    /// Export per-event results to CSV.
    #[arg(long, env = "RECO_EXPORT_EVENTS")]
    pub export_events: Option<PathBuf>,

    /// W histogram binning as `bins,lo,hi`.
    #[arg(long, env = "RECO_W_BINNING", value_parser = parse_binning, default_value = "80,0,200")]
    pub w_binning: Binning,

    /// Top histogram binning as `bins,lo,hi`.
    #[arg(long, env = "RECO_TOP_BINNING", value_parser = parse_binning, default_value = "80,0,400")]
    pub top_binning: Binning,

    /// Exotic histogram binning as `bins,lo,hi`.
    #[arg(long, env = "RECO_EXOTIC_BINNING", value_parser = parse_binning, default_value = "120,0,600")]
    pub exotic_binning: Binning,

    /// Skip the terminal summary.
    #[arg(short, long)]
    pub quiet: bool,
}

impl RunArgs {
    pub fn to_config(&self) -> RecoConfig {
        RecoConfig {
            input: self.input.clone(),
            first_entry: self.first_entry,
            last_entry: self.last_entry,
            cuts: SelectionCuts {
                jet_pt_min: self.jet_pt_min,
                jet_eta_max: self.jet_eta_max,
                min_selected_jets: self.min_jets,
                min_tagged_jets: self.min_tagged,
                max_tagged_jets: self.max_tagged,
            },
            masses: MassHypothesis {
                w_mass: self.w_mass,
                w_sigma: self.w_sigma,
                top_mass: self.top_mass,
                top_sigma: self.top_sigma,
                exotic_mass: self.exotic_mass,
                exotic_sigma: self.exotic_sigma,
                exotic_weight: self.exotic_weight,
            },
            workers: self.workers,
            output: self.output.clone(),
            export_events: self.export_events.clone(),
            w_binning: self.w_binning,
            top_binning: self.top_binning,
            exotic_binning: self.exotic_binning,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct SignificanceArgs {
    /// Histogram JSON produced by `reco run`.
    #[arg(value_name = "JSON")]
    pub histograms: PathBuf,

    /// Signal window half-width in units of the fitted sigma.
    #[arg(long, default_value_t = DEFAULT_WINDOW_WIDTH)]
    pub window_width: f64,

    /// Per-histogram fit range override as `NAME=LO,HI` (repeatable).
    #[arg(long = "fit-range", value_parser = parse_fit_range)]
    pub fit_ranges: Vec<(String, (f64, f64))>,

    /// Only analyze these histograms (default: all).
    #[arg(long = "histogram")]
    pub only: Vec<String>,

    /// Print results as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

impl SignificanceArgs {
    pub fn fit_range_for(&self, name: &str) -> (f64, f64) {
        self.fit_ranges
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, r)| *r)
            .unwrap_or_else(|| crate::hist::default_fit_range(name))
    }
}

#[derive(Debug, Args, Clone)]
pub struct GenerateArgs {
    /// Output CSV.
    #[arg(short, long, default_value = "events.csv")]
    pub output: PathBuf,

    /// Number of events.
    #[arg(short = 'n', long, default_value_t = 1_000)]
    pub events: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Fraction of events with one leptonic W decay.
    #[arg(long, default_value_t = 0.5)]
    pub semileptonic_fraction: f64,

    /// Fraction of events with an exotic two-jet resonance.
    #[arg(long, default_value_t = 1.0)]
    pub exotic_fraction: f64,

    /// Mean top pT (GeV).
    #[arg(long, default_value_t = 60.0)]
    pub top_pt_mean: f64,

    /// Mean number of soft extra jets.
    #[arg(long, default_value_t = 1.5)]
    pub extra_jets: f64,

    /// Relative jet energy resolution.
    #[arg(long, default_value_t = 0.08)]
    pub jet_resolution: f64,

    #[arg(long, default_value_t = 0.8)]
    pub btag_efficiency: f64,

    #[arg(long, default_value_t = 0.02)]
    pub mistag_rate: f64,
}

impl GenerateArgs {
    pub fn to_config(&self) -> SampleConfig {
        SampleConfig {
            events: self.events,
            seed: self.seed,
            semileptonic_fraction: self.semileptonic_fraction,
            exotic_fraction: self.exotic_fraction,
            top_pt_mean: self.top_pt_mean,
            extra_jets_mean: self.extra_jets,
            jet_resolution: self.jet_resolution,
            btag_efficiency: self.btag_efficiency,
            mistag_rate: self.mistag_rate,
        }
    }
}

fn parse_binning(s: &str) -> Result<Binning, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [bins, lo, hi] = parts.as_slice() else {
        return Err(format!("expected `bins,lo,hi`, got '{s}'"));
    };
    let bins: usize = bins.parse().map_err(|_| format!("invalid bin count '{bins}'"))?;
    let lo: f64 = lo.parse().map_err(|_| format!("invalid lower edge '{lo}'"))?;
    let hi: f64 = hi.parse().map_err(|_| format!("invalid upper edge '{hi}'"))?;
    Ok(Binning::new(bins, lo, hi))
}

fn parse_fit_range(s: &str) -> Result<(String, (f64, f64)), String> {
    let (name, range) = s
        .split_once('=')
        .ok_or_else(|| format!("expected `NAME=LO,HI`, got '{s}'"))?;
    let (lo, hi) = range
        .split_once(',')
        .ok_or_else(|| format!("expected `LO,HI` after '=', got '{range}'"))?;
    let lo: f64 = lo.trim().parse().map_err(|_| format!("invalid range start '{lo}'"))?;
    let hi: f64 = hi.trim().parse().map_err(|_| format!("invalid range end '{hi}'"))?;
    Ok((name.trim().to_string(), (lo, hi)))
}
