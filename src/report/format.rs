//! Formatted terminal output: run summaries and significance tables.
//!
//! Formatting lives here so the reconstruction code stays free of
//! presentation concerns and output changes stay localized.

use crate::app::pipeline::RunSummary;
use crate::domain::{DecayChannel, RecoConfig};
use crate::error::AppError;
use crate::hist::{Histogram, Significance};
use crate::io::HistogramFile;

/// Format the full run summary (inputs, outcome counts, histogram stats).
pub fn format_run_summary(summary: &RunSummary, config: &RecoConfig, histograms: &HistogramFile) -> String {
    let mut out = String::new();

    out.push_str("=== reco - combinatorial mass reconstruction ===\n");
    out.push_str(&format!("Input: {}\n", config.input.display()));
    out.push_str(&format!(
        "Entries: [{}, {}) | workers={} | runtime={:.3}s\n",
        summary.first_entry,
        summary.last_entry,
        summary.workers,
        summary.elapsed.as_secs_f64()
    ));
    out.push_str(&format!(
        "Cuts: jet pT > {} GeV, |eta| < {}, jets >= {}, tagged in [{}, {}]\n",
        config.cuts.jet_pt_min,
        config.cuts.jet_eta_max,
        config.cuts.min_selected_jets,
        config.cuts.min_tagged_jets,
        config.cuts.max_tagged_jets,
    ));

    out.push_str("\nOutcomes:\n");
    out.push_str(&format!("  processed       {:>8}\n", summary.processed));
    out.push_str(&format!(
        "  reconstructed   {:>8} ({} full hadronic, {} semi-leptonic)\n",
        summary.reconstructed, summary.full_hadronic, summary.semi_leptonic
    ));
    out.push_str(&format!("  too few jets    {:>8}\n", summary.skipped.too_few_jets));
    out.push_str(&format!("  tag window      {:>8}\n", summary.skipped.tag_window));
    out.push_str(&format!("  no pathway      {:>8}\n", summary.skipped.no_pathway));
    out.push_str(&format!("  no candidates   {:>8}\n", summary.skipped.no_candidates));
    out.push_str(&format!("  candidates      {:>8}\n", summary.candidates));

    out.push_str("\nChannels (events inside the tag window):\n");
    for channel in DecayChannel::ALL {
        let n = summary.channel_count(channel);
        if n > 0 {
            out.push_str(&format!(
                "  {} {:<36} {:>8}\n",
                channel.code(),
                channel.display_name(),
                n
            ));
        }
    }

    out.push_str("\nHistograms:\n");
    out.push_str(&format_histogram_table(&histograms.histograms));
    out
}

fn format_histogram_table(hists: &[Histogram]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<10} {:>8} {:>10} {:>10} {:>10} {:>10}\n",
            "name", "entries", "in range", "under", "over", "mean"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<10} {:-<8} {:-<10} {:-<10} {:-<10} {:-<10}", "", "", "", "", "", "").trim_end());
    out.push('\n');

    for h in hists {
        let mean = h.mean().map(|m| format!("{m:.2}")).unwrap_or_else(|| "-".to_string());
        out.push_str(
            format!(
                "{:<10} {:>8} {:>10.0} {:>10.0} {:>10.0} {:>10}",
                truncate(&h.name, 10),
                h.entries,
                h.total(),
                h.underflow(),
                h.overflow(),
                mean
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// One row of the significance table: histogram name and its result.
pub type SignificanceRow = (String, Result<Significance, AppError>);

pub fn format_significance_table(source: &str, rows: &[SignificanceRow]) -> String {
    let mut out = String::new();
    out.push_str(&format!("S/sqrt(B) analysis for: {source}\n"));
    out.push_str(&format!("{:-<50}\n", ""));

    for (name, result) in rows {
        match result {
            Ok(s) => out.push_str(&format!(
                "{name} -> mu = {:.2} GeV, sigma = {:.2} GeV, S = {:.1}, B = {:.1}, S/sqrt(B) = {}\n",
                s.mu,
                s.sigma,
                s.signal,
                s.background,
                fmt_snr(s.snr)
            )),
            Err(e) => out.push_str(&format!("{name}: {}\n", e.message())),
        }
    }
    out
}

fn fmt_snr(v: f64) -> String {
    if v.is_infinite() {
        if v > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else {
        format!("{v:.2}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Binning;
    use crate::hist::{GaussianFit, MassSink};

    #[test]
    fn summary_lists_outcomes_and_histograms() {
        let mut summary = RunSummary {
            first_entry: 0,
            last_entry: 10,
            processed: 10,
            reconstructed: 4,
            semi_leptonic: 4,
            workers: 4,
            ..RunSummary::default()
        };
        summary.channels[DecayChannel::SemiLeptonic.code() as usize] = 4;
        summary.skipped.too_few_jets = 6;

        let mut w = Histogram::new("W", "W", Binning::new(80, 0.0, 200.0));
        w.fill(80.0);
        let file = HistogramFile::new((0, 10), vec![w]);
        let config = RecoConfig::with_input("events.csv");

        let text = format_run_summary(&summary, &config, &file);
        assert!(text.contains("Input: events.csv"));
        assert!(text.contains("Entries: [0, 10)"));
        assert!(text.contains("semi-leptonic"));
        assert!(text.contains("too few jets           6"));
        assert!(!text.contains("full leptonic"));
        assert!(text.lines().any(|l| l.starts_with("W ") && l.contains("81.25")));
    }

    #[test]
    fn significance_table_shows_infinite_snr_and_errors() {
        let fit = GaussianFit {
            amplitude: 1.0,
            mu: 91.0,
            sigma: 5.0,
            chi2: 0.0,
            ndf: 1,
        };
        let rows = vec![
            (
                "W".to_string(),
                Ok(Significance {
                    mu: 91.0,
                    sigma: 5.0,
                    signal: 120.0,
                    background: 0.0,
                    snr: f64::INFINITY,
                    fit,
                }),
            ),
            ("top".to_string(), Err(AppError::compute("fit failed"))),
        ];
        let text = format_significance_table("h.json", &rows);
        assert!(text.contains("W -> mu = 91.00 GeV, sigma = 5.00 GeV, S = 120.0, B = 0.0, S/sqrt(B) = inf"));
        assert!(text.contains("top: fit failed"));
    }

    #[test]
    fn truncate_marks_cut_names() {
        assert_eq!(truncate("exotic", 10), "exotic");
        assert_eq!(truncate("a-very-long-name", 6), "a-ver.");
    }
}
