//! Read/write histogram JSON files.
//!
//! A histogram file is the portable result of a reconstruction run: the
//! filled W, top and exotic histograms plus a little run metadata. The
//! `significance` command reads it back.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::hist::Histogram;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    /// Entry range actually processed, `[first, last)`.
    pub entries: (usize, usize),
    pub histograms: Vec<Histogram>,
}

impl HistogramFile {
    pub fn new(entries: (usize, usize), histograms: Vec<Histogram>) -> Self {
        Self {
            tool: "reco".to_string(),
            created: Utc::now(),
            entries,
            histograms,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Histogram> {
        self.histograms.iter().find(|h| h.name == name)
    }
}

pub fn write_histograms_json(path: &Path, file: &HistogramFile) -> Result<(), AppError> {
    let out = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create histogram JSON '{}': {e}", path.display())))?;
    write_histograms(out, file)
}

pub fn write_histograms<W: Write>(out: W, file: &HistogramFile) -> Result<(), AppError> {
    serde_json::to_writer_pretty(out, file)
        .map_err(|e| AppError::input(format!("Failed to write histogram JSON: {e}")))
}

pub fn read_histograms_json(path: &Path) -> Result<HistogramFile, AppError> {
    let input = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open histogram JSON '{}': {e}", path.display())))?;
    read_histograms(input)
}

pub fn read_histograms<R: Read>(input: R) -> Result<HistogramFile, AppError> {
    let file: HistogramFile =
        serde_json::from_reader(input).map_err(|e| AppError::input(format!("Invalid histogram JSON: {e}")))?;
    for h in &file.histograms {
        if h.bins == 0 || h.counts.len() != h.bins + 2 || !(h.hi > h.lo) {
            return Err(AppError::input(format!(
                "Histogram '{}' is malformed: {} bins, {} stored counts, range [{}, {})",
                h.name,
                h.bins,
                h.counts.len(),
                h.lo,
                h.hi
            )));
        }
    }
    Ok(file)
}
