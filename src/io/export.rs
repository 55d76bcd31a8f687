//! Export per-event reconstruction results to CSV.
//!
//! One row per reconstructed event, easy to consume in spreadsheets or
//! downstream scripts. Skipped events are not written.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::AppError;
use crate::reco::ReconstructionResult;

pub const EVENT_EXPORT_HEADER: &str = "entry,channel,chi2,w1,w2,t1,t2,phi,jets";

/// Streaming writer; rows are appended as events are reconstructed.
pub struct EventExporter<W: Write> {
    out: W,
    rows: usize,
}

impl EventExporter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, AppError> {
        let file = File::create(path)
            .map_err(|e| AppError::input(format!("Failed to create export CSV '{}': {e}", path.display())))?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> EventExporter<W> {
    pub fn new(mut out: W) -> Result<Self, AppError> {
        writeln!(out, "{EVENT_EXPORT_HEADER}")
            .map_err(|e| AppError::input(format!("Failed to write export CSV header: {e}")))?;
        Ok(Self { out, rows: 0 })
    }

    pub fn write(&mut self, result: &ReconstructionResult) -> Result<(), AppError> {
        let s = result.score();
        // Pool indices of the assigned jets, in jet-slot order.
        let jets = result
            .best
            .candidate
            .jet_indices()
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            self.out,
            "{},{},{:.6},{:.4},{:.4},{:.4},{:.4},{:.4},{}",
            result.entry,
            result.channel.code(),
            s.chi2,
            s.w1,
            s.w2,
            s.t1,
            s.t2,
            s.phi,
            jets,
        )
        .map_err(|e| AppError::input(format!("Failed to write export CSV row: {e}")))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> Result<W, AppError> {
        self.out
            .flush()
            .map_err(|e| AppError::input(format!("Failed to flush export CSV: {e}")))?;
        Ok(self.out)
    }
}
