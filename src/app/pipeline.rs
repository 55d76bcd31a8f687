//! The reconstruction run: event loop, bookkeeping and outputs.
//!
//! open event file -> resolve entry range -> reconstruct each entry ->
//! fill histograms (+ optional per-event export) -> write histogram JSON
//!
//! A run that fails partway writes nothing: the export is staged and only
//! moved to its final path once every entry has been reconstructed.
//!
//! `analyze` is the loop itself and works on any `EventSource` and any
//! `MassSink`, so tests drive it with in-memory events and plain vectors.

use std::ffi::OsString;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{DecayChannel, RecoConfig};
use crate::error::AppError;
use crate::hist::{Histogram, MassSink};
use crate::io::{CsvEventSource, EventExporter, EventSource, HistogramFile, write_histograms_json};
use crate::reco::{EventOutcome, HypothesisKind, MassSinks, Minimizer, ReconstructionResult, SkipReason, reconstruct_event};

/// Event counts of one run, by outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub first_entry: usize,
    pub last_entry: usize,
    pub processed: usize,
    pub reconstructed: usize,
    pub full_hadronic: usize,
    pub semi_leptonic: usize,
    /// Events per channel code, counted for events that passed the tag window.
    pub channels: [usize; 8],
    pub skipped: SkipCounts,
    /// Total assignments scored across all events.
    pub candidates: u64,
    pub workers: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub too_few_jets: usize,
    pub tag_window: usize,
    pub no_pathway: usize,
    pub no_candidates: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.too_few_jets + self.tag_window + self.no_pathway + self.no_candidates
    }
}

impl RunSummary {
    pub fn channel_count(&self, channel: DecayChannel) -> usize {
        self.channels[channel.code() as usize]
    }

    fn record(&mut self, outcome: &EventOutcome) {
        self.processed += 1;
        match outcome {
            EventOutcome::Reconstructed(r) => {
                self.reconstructed += 1;
                self.channels[r.channel.code() as usize] += 1;
                self.candidates += r.candidates as u64;
                match r.kind {
                    HypothesisKind::FullHadronic => self.full_hadronic += 1,
                    HypothesisKind::SemiLeptonic => self.semi_leptonic += 1,
                }
            }
            EventOutcome::Skipped(reason) => match *reason {
                SkipReason::TooFewJets { .. } => self.skipped.too_few_jets += 1,
                SkipReason::TagWindow { .. } => self.skipped.tag_window += 1,
                SkipReason::NoPathway { channel } => {
                    self.skipped.no_pathway += 1;
                    self.channels[channel.code() as usize] += 1;
                }
                SkipReason::NoCandidates { channel } => {
                    self.skipped.no_candidates += 1;
                    self.channels[channel.code() as usize] += 1;
                }
            },
        }
    }
}

/// All outputs of a single `reco run`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub histograms: HistogramFile,
    pub row_errors: usize,
    pub exported: Option<usize>,
}

/// Clamp the configured entry range to the dataset.
pub fn resolve_range(config: &RecoConfig, entries: usize) -> Range<usize> {
    let last = config.last_entry.unwrap_or(entries).min(entries);
    let first = config.first_entry.min(last);
    first..last
}

/// Reconstruct every entry in `range`, filling `sinks` and handing each
/// reconstruction to `on_result`.
pub fn analyze<E, S, F>(
    source: &mut E,
    range: Range<usize>,
    config: &RecoConfig,
    minimizer: &Minimizer,
    sinks: &mut MassSinks<S>,
    mut on_result: F,
) -> Result<RunSummary, AppError>
where
    E: EventSource + ?Sized,
    S: MassSink,
    F: FnMut(&ReconstructionResult) -> Result<(), AppError>,
{
    let started = Instant::now();
    let mut summary = RunSummary {
        first_entry: range.start,
        last_entry: range.end,
        workers: minimizer.workers(),
        ..RunSummary::default()
    };

    for entry in range {
        let event = source.read_entry(entry)?;
        let outcome = reconstruct_event(&event, config, minimizer, sinks)?;
        match &outcome {
            EventOutcome::Reconstructed(result) => {
                debug!(
                    entry,
                    channel = result.channel.display_name(),
                    candidates = result.candidates,
                    chi2 = result.score().chi2,
                    "reconstructed"
                );
                on_result(result)?;
            }
            EventOutcome::Skipped(reason) => debug!(entry, ?reason, "skipped"),
        }
        summary.record(&outcome);
    }

    summary.elapsed = started.elapsed();
    Ok(summary)
}

pub fn output_sinks(config: &RecoConfig) -> MassSinks<Histogram> {
    MassSinks {
        w_boson: Histogram::new("W", "W Reconstruction; Mass (GeV); Abundance", config.w_binning),
        top_quark: Histogram::new("top", "Top Reconstruction; Mass (GeV); Abundance", config.top_binning),
        exotic: Histogram::new("exotic", "Exotic Reconstruction; Mass (GeV); Abundance", config.exotic_binning),
    }
}

/// Execute a full reconstruction run and write its outputs.
pub fn run_reco(config: &RecoConfig) -> Result<RunOutput, AppError> {
    config.validate()?;

    let mut source = CsvEventSource::open(&config.input)?;
    for e in &source.row_errors {
        debug!(line = e.line, event = ?e.event, "{}", e.message);
    }
    if !source.row_errors.is_empty() {
        warn!(
            rows = source.rows_read,
            errors = source.row_errors.len(),
            "skipped malformed rows in event file"
        );
    }
    if source.entries() == 0 {
        return Err(AppError::no_data(format!(
            "No valid events in '{}'.",
            config.input.display()
        )));
    }

    let range = resolve_range(config, source.entries());
    if config.last_entry.is_some_and(|last| last > source.entries()) {
        warn!(
            requested = ?config.last_entry,
            available = source.entries(),
            "entry range clamped to dataset"
        );
    }
    info!(
        input = %config.input.display(),
        first = range.start,
        last = range.end,
        workers = config.workers,
        "starting reconstruction"
    );

    let mut output = reconstruct_to_files(&mut source, range, config)?;
    output.row_errors = source.row_errors.len();
    Ok(output)
}

/// Reconstruct `range` of `source`, then write the histogram JSON and the
/// optional per-event export.
///
/// The export is staged next to its destination and renamed into place only
/// after the whole range succeeded, so a failed run leaves no partial file.
pub fn reconstruct_to_files<E>(source: &mut E, range: Range<usize>, config: &RecoConfig) -> Result<RunOutput, AppError>
where
    E: EventSource + ?Sized,
{
    let minimizer = Minimizer::new(config.workers)?;
    let mut sinks = output_sinks(config);
    let staged = config.export_events.as_deref().map(|path| (staging_path(path), path));
    let mut exporter = staged
        .as_ref()
        .map(|(staging, _)| EventExporter::create(staging))
        .transpose()?;

    let analyzed = analyze(source, range.clone(), config, &minimizer, &mut sinks, |result| {
        match exporter.as_mut() {
            Some(x) => x.write(result),
            None => Ok(()),
        }
    });

    let finished = analyzed.and_then(|summary| {
        let exported = match exporter {
            Some(x) => {
                let rows = x.rows();
                x.finish()?;
                Some(rows)
            }
            None => None,
        };
        let histograms = HistogramFile::new(
            (range.start, range.end),
            vec![sinks.w_boson, sinks.top_quark, sinks.exotic],
        );
        write_histograms_json(&config.output, &histograms)?;
        Ok((summary, histograms, exported))
    });

    let (summary, histograms, exported) = match finished {
        Ok(done) => done,
        Err(e) => {
            if let Some((staging, _)) = &staged {
                discard(staging);
            }
            return Err(e);
        }
    };

    if let Some((staging, path)) = &staged {
        fs::rename(staging, path).map_err(|e| {
            discard(staging);
            AppError::input(format!("Failed to move export CSV into '{}': {e}", path.display()))
        })?;
    }

    if summary.reconstructed == 0 {
        warn!(processed = summary.processed, "no events were reconstructed");
    }
    info!(
        processed = summary.processed,
        reconstructed = summary.reconstructed,
        skipped = summary.skipped.total(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        output = %config.output.display(),
        "reconstruction finished"
    );

    Ok(RunOutput {
        summary,
        histograms,
        row_errors: 0,
        exported,
    })
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn discard(staging: &Path) {
    if let Err(e) = fs::remove_file(staging) {
        warn!(path = %staging.display(), error = %e, "failed to remove staged export");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SampleConfig, generate_events};
    use crate::domain::{Event, MissingEnergy};
    use crate::io::{EVENT_EXPORT_HEADER, write_events_csv};

    fn loose_config() -> RecoConfig {
        let mut config = RecoConfig::with_input("unused.csv");
        config.cuts.jet_pt_min = 0.0;
        config.cuts.jet_eta_max = 10.0;
        config.workers = 2;
        config
    }

    /// Clean semi-leptonic events: two tagged b jets, four light jets, one lepton.
    fn semi_leptonic_events(n: usize) -> Vec<Event> {
        generate_events(&SampleConfig {
            events: n,
            semileptonic_fraction: 1.0,
            extra_jets_mean: 0.0,
            btag_efficiency: 1.0,
            mistag_rate: 0.0,
            ..SampleConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn range_is_clamped_to_dataset() {
        let mut config = loose_config();
        assert_eq!(resolve_range(&config, 10), 0..10);
        config.first_entry = 3;
        config.last_entry = Some(7);
        assert_eq!(resolve_range(&config, 10), 3..7);
        config.last_entry = Some(70);
        assert_eq!(resolve_range(&config, 10), 3..10);
        config.first_entry = 12;
        config.last_entry = None;
        assert!(resolve_range(&config, 10).is_empty());
    }

    #[test]
    fn every_clean_event_is_reconstructed() {
        let config = loose_config();
        let mut events = semi_leptonic_events(12);
        let minimizer = Minimizer::new(config.workers).unwrap();
        let mut sinks: MassSinks<Vec<f64>> = MassSinks::default();
        let mut seen = Vec::new();

        let summary = analyze(&mut events, 2..10, &config, &minimizer, &mut sinks, |r| {
            seen.push(r.entry);
            Ok(())
        })
        .unwrap();

        assert_eq!(summary.processed, 8);
        assert_eq!(summary.reconstructed, 8);
        assert_eq!(summary.semi_leptonic, 8);
        assert_eq!(summary.channel_count(DecayChannel::SemiLeptonic), 8);
        assert_eq!(summary.candidates, 8 * 720);
        assert_eq!(seen, (2..10).collect::<Vec<_>>());
        assert_eq!(sinks.w_boson.len(), 16);
        assert_eq!(sinks.top_quark.len(), 16);
        assert_eq!(sinks.exotic.len(), 8);
    }

    #[test]
    fn skips_are_counted_and_leave_sinks_empty() {
        let config = loose_config();
        let mut events: Vec<Event> = semi_leptonic_events(3)
            .into_iter()
            .map(|mut e| {
                e.jets.truncate(5);
                e
            })
            .collect();
        events.push(Event {
            entry: 3,
            jets: Vec::new(),
            electrons: Vec::new(),
            muons: Vec::new(),
            missing: MissingEnergy::new(10.0, 0.0, 0.0),
        });

        let minimizer = Minimizer::new(1).unwrap();
        let mut sinks: MassSinks<Vec<f64>> = MassSinks::default();
        let summary = analyze(&mut events, 0..4, &config, &minimizer, &mut sinks, |_| Ok(())).unwrap();

        assert_eq!(summary.processed, 4);
        assert_eq!(summary.reconstructed, 0);
        assert_eq!(summary.skipped.too_few_jets, 4);
        assert!(sinks.w_boson.is_empty());
    }

    #[test]
    fn reconstruction_is_independent_of_worker_count() {
        let config = loose_config();
        let events = semi_leptonic_events(5);

        let mut results = Vec::new();
        for workers in [1, 3] {
            let minimizer = Minimizer::new(workers).unwrap();
            let mut sinks: MassSinks<Vec<f64>> = MassSinks::default();
            let mut source = events.clone();
            analyze(&mut source, 0..5, &config, &minimizer, &mut sinks, |_| Ok(())).unwrap();
            results.push(sinks.w_boson);
        }
        assert_eq!(results[0], results[1]);
    }

    #[test]
    fn full_run_writes_histograms_and_export() {
        let dir = std::env::temp_dir().join(format!("mass-reco-run-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("events.csv");
        let output = dir.join("histograms.json");
        let export = dir.join("events-out.csv");

        let events = semi_leptonic_events(6);
        write_events_csv(std::fs::File::create(&input).unwrap(), &events).unwrap();

        let mut config = loose_config();
        config.input = input;
        config.output = output.clone();
        config.export_events = Some(export.clone());

        let run = run_reco(&config).unwrap();
        assert_eq!(run.summary.reconstructed, 6);
        assert_eq!(run.exported, Some(6));
        assert_eq!(run.row_errors, 0);

        let saved = crate::io::read_histograms_json(&output).unwrap();
        assert_eq!(saved.entries, (0, 6));
        assert_eq!(saved.get("W").map(|h| h.entries), Some(12));

        let csv = std::fs::read_to_string(&export).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(EVENT_EXPORT_HEADER));
        assert_eq!(lines.count(), 6);

        std::fs::remove_dir_all(&dir).ok();
    }

    /// Serves events until `fail_at`, then reports a compute failure.
    struct FailingSource {
        events: Vec<Event>,
        fail_at: usize,
    }

    impl EventSource for FailingSource {
        fn entries(&self) -> usize {
            self.events.len()
        }

        fn read_entry(&mut self, entry: usize) -> Result<Event, AppError> {
            if entry == self.fail_at {
                return Err(AppError::compute(format!("worker failed on entry {entry}")));
            }
            self.events.read_entry(entry)
        }
    }

    #[test]
    fn failed_run_leaves_no_output_files() {
        let dir = std::env::temp_dir().join(format!("mass-reco-abort-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let output = dir.join("histograms.json");
        let export = dir.join("events-out.csv");

        let mut config = loose_config();
        config.output = output.clone();
        config.export_events = Some(export.clone());

        let mut source = FailingSource {
            events: semi_leptonic_events(4),
            fail_at: 2,
        };
        let err = reconstruct_to_files(&mut source, 0..4, &config).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(!export.exists());
        assert!(!staging_path(&export).exists());
        assert!(!output.exists());

        // The same source over a range that avoids the failure publishes both files.
        let run = reconstruct_to_files(&mut source, 0..2, &config).unwrap();
        assert_eq!(run.exported, Some(2));
        assert!(export.exists());
        assert!(!staging_path(&export).exists());
        assert!(output.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_input_is_an_input_error() {
        let config = RecoConfig::with_input("/definitely/not/here.csv");
        assert_eq!(run_reco(&config).unwrap_err().exit_code(), 2);
    }
}
