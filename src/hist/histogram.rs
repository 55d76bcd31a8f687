//! Fixed-bin 1D histograms used as reconstruction output sinks.
//!
//! Bin numbering follows the usual analysis convention:
//! bin 0 is underflow, bins `1..=bins` cover `[lo, hi)`, bin `bins + 1` is
//! overflow. Integrals take inclusive bin ranges.

use serde::{Deserialize, Serialize};

use crate::domain::Binning;

/// Append-only numeric sink fed by the event dispatcher.
pub trait MassSink {
    fn fill(&mut self, value: f64);
}

impl MassSink for Vec<f64> {
    fn fill(&mut self, value: f64) {
        self.push(value);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub name: String,
    pub title: String,
    pub bins: usize,
    pub lo: f64,
    pub hi: f64,
    /// `bins + 2` entries including under/overflow.
    pub counts: Vec<f64>,
    /// Number of fill calls.
    pub entries: u64,
}

impl Histogram {
    pub fn new(name: impl Into<String>, title: impl Into<String>, binning: Binning) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            bins: binning.bins,
            lo: binning.lo,
            hi: binning.hi,
            counts: vec![0.0; binning.bins + 2],
            entries: 0,
        }
    }

    pub fn binning(&self) -> Binning {
        Binning::new(self.bins, self.lo, self.hi)
    }

    pub fn bin_width(&self) -> f64 {
        (self.hi - self.lo) / self.bins as f64
    }

    /// Bin holding `x`; NaN lands in overflow.
    pub fn find_bin(&self, x: f64) -> usize {
        if x.is_nan() || x >= self.hi {
            return self.bins + 1;
        }
        if x < self.lo {
            return 0;
        }
        let idx = ((x - self.lo) / self.bin_width()).floor() as usize;
        (idx + 1).min(self.bins)
    }

    pub fn fill_weighted(&mut self, x: f64, weight: f64) {
        let bin = self.find_bin(x);
        self.counts[bin] += weight;
        self.entries += 1;
    }

    pub fn bin_content(&self, bin: usize) -> f64 {
        self.counts.get(bin).copied().unwrap_or(0.0)
    }

    pub fn set_bin_content(&mut self, bin: usize, value: f64) {
        if let Some(c) = self.counts.get_mut(bin) {
            *c = value;
        }
    }

    pub fn bin_low_edge(&self, bin: usize) -> f64 {
        self.lo + (bin as f64 - 1.0) * self.bin_width()
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        self.bin_low_edge(bin) + 0.5 * self.bin_width()
    }

    /// Sum of bin contents over `first..=last`, clamped to the stored bins.
    pub fn integral(&self, first: usize, last: usize) -> f64 {
        let last = last.min(self.bins + 1);
        if first > last {
            return 0.0;
        }
        self.counts[first..=last].iter().sum()
    }

    /// Sum over the in-range bins only.
    pub fn total(&self) -> f64 {
        self.integral(1, self.bins)
    }

    pub fn underflow(&self) -> f64 {
        self.counts[0]
    }

    pub fn overflow(&self) -> f64 {
        self.counts[self.bins + 1]
    }

    /// Index (1-based) and content of the highest in-range bin.
    pub fn maximum_bin(&self) -> Option<(usize, f64)> {
        (1..=self.bins)
            .map(|b| (b, self.counts[b]))
            .fold(None, |best, (b, c)| match best {
                Some((_, bc)) if bc >= c => best,
                _ => Some((b, c)),
            })
    }

    /// Content-weighted mean of the in-range bin centers.
    pub fn mean(&self) -> Option<f64> {
        let total = self.total();
        if total <= 0.0 {
            return None;
        }
        let sum: f64 = (1..=self.bins).map(|b| self.counts[b] * self.bin_center(b)).sum();
        Some(sum / total)
    }
}

impl MassSink for Histogram {
    fn fill(&mut self, value: f64) {
        self.fill_weighted(value, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist() -> Histogram {
        Histogram::new("w", "W Reconstruction; Mass(GeV); Abundance", Binning::new(80, 0.0, 200.0))
    }

    #[test]
    fn find_bin_uses_under_and_overflow() {
        let h = hist();
        assert_eq!(h.find_bin(-1.0), 0);
        assert_eq!(h.find_bin(0.0), 1);
        assert_eq!(h.find_bin(2.4999), 1);
        assert_eq!(h.find_bin(2.5), 2);
        assert_eq!(h.find_bin(199.99), 80);
        assert_eq!(h.find_bin(200.0), 81);
        assert_eq!(h.find_bin(f64::NAN), 81);
    }

    #[test]
    fn fills_accumulate_and_integrate() {
        let mut h = hist();
        for v in [81.3, 81.4, 79.9, 172.6, -5.0, 250.0] {
            h.fill(v);
        }
        assert_eq!(h.entries, 6);
        assert_eq!(h.bin_content(h.find_bin(81.3)), 2.0);
        assert_eq!(h.bin_content(h.find_bin(79.9)), 1.0);
        assert_eq!(h.underflow(), 1.0);
        assert_eq!(h.overflow(), 1.0);
        assert_eq!(h.total(), 4.0);
        assert_eq!(h.integral(0, 1_000), 6.0);
        assert_eq!(h.integral(10, 5), 0.0);
    }

    #[test]
    fn bin_geometry() {
        let h = hist();
        assert!((h.bin_width() - 2.5).abs() < 1e-12);
        assert!((h.bin_low_edge(1) - 0.0).abs() < 1e-12);
        assert!((h.bin_center(33) - 81.25).abs() < 1e-12);
    }

    #[test]
    fn maximum_and_mean() {
        let mut h = hist();
        assert!(h.mean().is_none());
        h.fill(80.0);
        h.fill(80.5);
        h.fill(90.0);
        let (bin, content) = h.maximum_bin().unwrap();
        assert_eq!(bin, h.find_bin(80.0));
        assert_eq!(content, 2.0);
        assert!(h.mean().unwrap() > 80.0);
    }
}
