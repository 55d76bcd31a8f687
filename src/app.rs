//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - sets up logging
//! - runs the requested command and prints its report

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, GenerateArgs, RunArgs, SignificanceArgs};
use crate::error::AppError;
use crate::hist::compute_significance;
use crate::report::SignificanceRow;

pub mod pipeline;

/// Entry point for the `reco` binary.
pub fn run() -> Result<(), AppError> {
    // Before parsing, so `RECO_*` values from `.env` reach clap.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Significance(args) => handle_significance(args),
        Command::Generate(args) => handle_generate(args),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Logs go to stderr; stdout carries the reports.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = args.to_config();
    let run = pipeline::run_reco(&config)?;

    if !args.quiet {
        println!(
            "{}",
            crate::report::format_run_summary(&run.summary, &config, &run.histograms)
        );
        if run.row_errors > 0 {
            println!("Skipped {} malformed row(s) in the event file.", run.row_errors);
        }
        if let (Some(path), Some(rows)) = (&config.export_events, run.exported) {
            println!("Exported {rows} event(s) to {}", path.display());
        }
        println!("Histograms written to {}", config.output.display());
    }
    Ok(())
}

fn handle_significance(args: SignificanceArgs) -> Result<(), AppError> {
    let file = crate::io::read_histograms_json(&args.histograms)?;

    let mut rows: Vec<SignificanceRow> = Vec::new();
    let names: Vec<String> = if args.only.is_empty() {
        file.histograms.iter().map(|h| h.name.clone()).collect()
    } else {
        args.only.clone()
    };

    for name in names {
        let result = match file.get(&name) {
            Some(hist) => compute_significance(hist, args.fit_range_for(&name), args.window_width),
            None => Err(AppError::input("Histogram not found!")),
        };
        if let Err(e) = &result {
            warn!(histogram = %name, "{}", e.message());
        }
        rows.push((name, result));
    }

    if rows.iter().all(|(_, r)| r.is_err()) {
        return Err(AppError::compute(format!(
            "No histogram in '{}' could be fitted.",
            args.histograms.display()
        )));
    }

    if args.json {
        let json: serde_json::Map<String, serde_json::Value> = rows
            .iter()
            .filter_map(|(name, r)| r.as_ref().ok().map(|s| (name.clone(), significance_json(s))))
            .collect();
        let text = serde_json::to_string_pretty(&json)
            .map_err(|e| AppError::compute(format!("Failed to encode results: {e}")))?;
        println!("{text}");
    } else {
        println!(
            "{}",
            crate::report::format_significance_table(&args.histograms.display().to_string(), &rows)
        );
    }
    Ok(())
}

/// JSON has no infinity; an unbounded SNR is written as `null`.
fn significance_json(s: &crate::hist::Significance) -> serde_json::Value {
    serde_json::json!({
        "mu": s.mu,
        "sigma": s.sigma,
        "S": s.signal,
        "B": s.background,
        "SNR": if s.snr.is_finite() { Some(s.snr) } else { None },
        "fit": s.fit,
    })
}

fn handle_generate(args: GenerateArgs) -> Result<(), AppError> {
    let config = args.to_config();
    let events = crate::data::generate_events(&config)?;

    let file = std::fs::File::create(&args.output).map_err(|e| {
        AppError::input(format!("Failed to create event file '{}': {e}", args.output.display()))
    })?;
    crate::io::write_events_csv(std::io::BufWriter::new(file), &events)?;

    info!(events = events.len(), seed = config.seed, output = %args.output.display(), "events generated");
    println!("Wrote {} events to {}", events.len(), args.output.display());
    Ok(())
}
