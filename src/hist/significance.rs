//! Peak significance from a Gaussian fit and sideband background.
//!
//! Steps:
//! 1. fit `A·exp(-½((x-μ)/σ)²)` to the non-empty bins whose centers lie in
//!    the fit range (Poisson errors `√n`)
//! 2. signal window: `μ ± w·σ`
//! 3. sidebands: `[μ − 2wσ, μ − wσ]` and `[μ + wσ, μ + 2wσ]`
//! 4. background = mean per-bin sideband content × signal-window bin span
//! 5. `S = total in window − B`, `SNR = S/√B` (`+∞` when `B ≤ 0`)
//!
//! The fit is seeded by a weighted least squares parabola through `ln n_i`
//! and refined with damped Gauss–Newton steps.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::hist::Histogram;
use crate::math::solve_weighted_least_squares;

pub const DEFAULT_FIT_RANGE: (f64, f64) = (60.0, 140.0);
pub const DEFAULT_WINDOW_WIDTH: f64 = 2.0;

/// Fit range used for the histograms a reconstruction run writes.
pub fn default_fit_range(histogram: &str) -> (f64, f64) {
    match histogram {
        "W" => (50.0, 110.0),
        "top" => (100.0, 250.0),
        _ => DEFAULT_FIT_RANGE,
    }
}

const MAX_ITERATIONS: usize = 100;
const MAX_HALVINGS: usize = 20;
const CHI2_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianFit {
    pub amplitude: f64,
    pub mu: f64,
    pub sigma: f64,
    pub chi2: f64,
    pub ndf: usize,
}

impl GaussianFit {
    pub fn eval(&self, x: f64) -> f64 {
        let z = (x - self.mu) / self.sigma;
        self.amplitude * (-0.5 * z * z).exp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Significance {
    pub mu: f64,
    pub sigma: f64,
    pub signal: f64,
    pub background: f64,
    pub snr: f64,
    pub fit: GaussianFit,
}

pub fn compute_significance(
    hist: &Histogram,
    fit_range: (f64, f64),
    window_width: f64,
) -> Result<Significance, AppError> {
    if !(window_width.is_finite() && window_width > 0.0) {
        return Err(AppError::input(format!("Invalid window width: {window_width}")));
    }

    let fit = fit_gaussian(hist, fit_range)?;
    let (mu, sigma) = (fit.mu, fit.sigma);
    let half = window_width * sigma;

    let sig_min = hist.find_bin(mu - half);
    let sig_max = hist.find_bin(mu + half);
    let window_total = hist.integral(sig_min, sig_max);

    let left_min = hist.find_bin(mu - 2.0 * half);
    let left_max = hist.find_bin(mu - half);
    let right_min = hist.find_bin(mu + half);
    let right_max = hist.find_bin(mu + 2.0 * half);

    let sideband_total = hist.integral(left_min, left_max) + hist.integral(right_min, right_max);
    let sideband_bins = (left_max - left_min) + (right_max - right_min);
    let per_bin = if sideband_bins > 0 {
        sideband_total / sideband_bins as f64
    } else {
        0.0
    };

    let background = per_bin * (sig_max - sig_min) as f64;
    let signal = window_total - background;
    let snr = if background > 0.0 {
        signal / background.sqrt()
    } else {
        f64::INFINITY
    };

    Ok(Significance {
        mu,
        sigma,
        signal,
        background,
        snr,
        fit,
    })
}

pub fn fit_gaussian(hist: &Histogram, range: (f64, f64)) -> Result<GaussianFit, AppError> {
    let (lo, hi) = range;
    if !(lo.is_finite() && hi.is_finite() && hi > lo) {
        return Err(AppError::input(format!("Invalid fit range: [{lo}, {hi}]")));
    }

    let points: Vec<(f64, f64)> = (1..=hist.bins)
        .map(|b| (hist.bin_center(b), hist.bin_content(b)))
        .filter(|&(x, n)| x >= lo && x <= hi && n > 0.0 && n.is_finite())
        .collect();
    if points.len() < 3 {
        return Err(AppError::compute(format!(
            "Histogram '{}' has {} non-empty bins in [{lo}, {hi}]; need at least 3 to fit.",
            hist.name,
            points.len()
        )));
    }

    let (mut amplitude, mut mu, mut sigma) = seed_parameters(&points);
    let mut chi2 = chi2_of(&points, amplitude, mu, sigma);

    for _ in 0..MAX_ITERATIONS {
        let Some((da, dmu, dsigma)) = gauss_newton_step(&points, amplitude, mu, sigma) else {
            break;
        };

        let mut step = 1.0;
        let mut improved = None;
        for _ in 0..MAX_HALVINGS {
            let (a, m, s) = (amplitude + step * da, mu + step * dmu, (sigma + step * dsigma).abs());
            let c = chi2_of(&points, a, m, s);
            if c.is_finite() && c <= chi2 {
                improved = Some((a, m, s, c));
                break;
            }
            step *= 0.5;
        }

        let Some((a, m, s, c)) = improved else {
            break;
        };
        let converged = (chi2 - c) <= CHI2_TOLERANCE * chi2.max(1.0);
        amplitude = a;
        mu = m;
        sigma = s;
        chi2 = c;
        if converged {
            break;
        }
    }

    if !(amplitude.is_finite() && mu.is_finite() && sigma.is_finite() && sigma > 0.0) {
        return Err(AppError::compute(format!(
            "Gaussian fit of '{}' did not converge to finite parameters.",
            hist.name
        )));
    }

    Ok(GaussianFit {
        amplitude,
        mu,
        sigma,
        chi2,
        ndf: points.len().saturating_sub(3),
    })
}

/// Parabola through `ln n` (weights `n`), falling back to moments when the
/// parabola opens upward.
fn seed_parameters(points: &[(f64, f64)]) -> (f64, f64, f64) {
    let x0 = points.iter().map(|p| p.0).sum::<f64>() / points.len() as f64;
    let rows: Vec<Vec<f64>> = points
        .iter()
        .map(|&(x, _)| {
            let u = x - x0;
            vec![1.0, u, u * u]
        })
        .collect();
    let y: Vec<f64> = points.iter().map(|p| p.1.ln()).collect();
    let w: Vec<f64> = points.iter().map(|p| p.1).collect();

    if let Some(beta) = solve_weighted_least_squares(&rows, &y, &w) {
        let (a, b, c) = (beta[0], beta[1], beta[2]);
        if c < 0.0 {
            let sigma = (-1.0 / (2.0 * c)).sqrt();
            let mu = x0 - b / (2.0 * c);
            let amplitude = (a - b * b / (4.0 * c)).exp();
            if amplitude.is_finite() && mu.is_finite() && sigma.is_finite() {
                return (amplitude, mu, sigma);
            }
        }
    }

    let total: f64 = points.iter().map(|p| p.1).sum();
    let mu = points.iter().map(|p| p.0 * p.1).sum::<f64>() / total;
    let var = points.iter().map(|p| p.1 * (p.0 - mu).powi(2)).sum::<f64>() / total;
    let amplitude = points.iter().map(|p| p.1).fold(0.0, f64::max);
    (amplitude, mu, var.sqrt().max(1e-6))
}

fn chi2_of(points: &[(f64, f64)], amplitude: f64, mu: f64, sigma: f64) -> f64 {
    points
        .iter()
        .map(|&(x, n)| {
            let z = (x - mu) / sigma;
            let r = n - amplitude * (-0.5 * z * z).exp();
            r * r / n
        })
        .sum()
}

fn gauss_newton_step(points: &[(f64, f64)], amplitude: f64, mu: f64, sigma: f64) -> Option<(f64, f64, f64)> {
    let mut rows = Vec::with_capacity(points.len());
    let mut residuals = Vec::with_capacity(points.len());
    let mut weights = Vec::with_capacity(points.len());

    for &(x, n) in points {
        let z = (x - mu) / sigma;
        let g = (-0.5 * z * z).exp();
        rows.push(vec![g, amplitude * g * z / sigma, amplitude * g * z * z / sigma]);
        residuals.push(n - amplitude * g);
        weights.push(1.0 / n);
    }

    let delta = solve_weighted_least_squares(&rows, &residuals, &weights)?;
    Some((delta[0], delta[1], delta[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Binning;
    use crate::hist::MassSink;
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    fn gaussian_bins(hist: &mut Histogram, amplitude: f64, mu: f64, sigma: f64, keep: (f64, f64)) {
        for b in 1..=hist.bins {
            let x = hist.bin_center(b);
            if x >= keep.0 && x <= keep.1 {
                let z = (x - mu) / sigma;
                hist.set_bin_content(b, amplitude * (-0.5 * z * z).exp());
            }
        }
    }

    #[test]
    fn exact_gaussian_is_recovered() {
        let mut h = Histogram::new("peak", "peak", Binning::new(200, 0.0, 200.0));
        gaussian_bins(&mut h, 250.0, 91.0, 5.0, (70.0, 112.0));
        let fit = fit_gaussian(&h, (60.0, 140.0)).unwrap();
        assert!((fit.mu - 91.0).abs() < 1e-6);
        assert!((fit.sigma - 5.0).abs() < 1e-6);
        assert!((fit.amplitude - 250.0).abs() < 1e-4);
    }

    #[test]
    fn empty_sidebands_give_infinite_snr() {
        // Peak confined to bins strictly inside mu ± 2 sigma.
        let mut h = Histogram::new("peak", "peak", Binning::new(200, 0.0, 200.0));
        gaussian_bins(&mut h, 100.0, 91.0, 5.0, (83.0, 99.0));

        let sig = compute_significance(&h, (60.0, 140.0), 2.0).unwrap();
        assert!((sig.mu - 91.0).abs() < 1e-6);
        assert!((sig.sigma - 5.0).abs() < 1e-6);
        assert_eq!(sig.background, 0.0);
        assert!(sig.snr.is_infinite() && sig.snr > 0.0);
        assert!((sig.signal - h.total()).abs() < 1e-9);
    }

    #[test]
    fn peak_over_flat_background_has_finite_snr() {
        let mut rng = StdRng::seed_from_u64(91);
        let normal = Normal::new(91.0, 5.0).unwrap();
        let mut h = Histogram::new("w", "w", Binning::new(80, 0.0, 200.0));
        for _ in 0..20_000 {
            h.fill(normal.sample(&mut rng));
        }
        for _ in 0..2_000 {
            h.fill(rng.gen_range(0.0..200.0));
        }

        let sig = compute_significance(&h, DEFAULT_FIT_RANGE, DEFAULT_WINDOW_WIDTH).unwrap();
        assert!((sig.mu - 91.0).abs() < 0.5, "mu = {}", sig.mu);
        assert!((sig.sigma - 5.0).abs() < 1.0, "sigma = {}", sig.sigma);
        assert!(sig.background > 0.0);
        assert!(sig.snr.is_finite() && sig.snr > 10.0);
    }

    #[test]
    fn too_few_bins_is_an_error() {
        let mut h = Histogram::new("w", "w", Binning::new(80, 0.0, 200.0));
        h.fill(90.0);
        h.fill(92.6);
        let err = compute_significance(&h, DEFAULT_FIT_RANGE, DEFAULT_WINDOW_WIDTH).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
