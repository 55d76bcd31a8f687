//! Weighted least squares solver.
//!
//! The significance module repeatedly solves tiny linear problems of the form
//!
//! ```text
//! minimize Σ w_i (y_i - x_i^T β)^2
//! ```
//!
//! once for the log-parabola seed of the Gaussian fit and once per
//! Gauss–Newton step. Rows are scaled by `sqrt(w_i)` and the resulting
//! ordinary least squares problem is solved with SVD, which handles the tall
//! (more bins than parameters) design matrices directly.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve `minimize Σ w_i (y_i - x_i^T β)^2` by row scaling.
///
/// `rows` holds one design row per observation; all rows must share a length.
pub fn solve_weighted_least_squares(rows: &[Vec<f64>], y: &[f64], w: &[f64]) -> Option<DVector<f64>> {
    let n = rows.len();
    if n == 0 || y.len() != n || w.len() != n {
        return None;
    }
    let p = rows[0].len();
    if p == 0 || n < p {
        return None;
    }

    let mut xw = DMatrix::<f64>::zeros(n, p);
    let mut yw = DVector::<f64>::zeros(n);
    for i in 0..n {
        if rows[i].len() != p || !(w[i].is_finite() && w[i] > 0.0) {
            return None;
        }
        let sw = w[i].sqrt();
        for j in 0..p {
            xw[(i, j)] = rows[i][j] * sw;
        }
        yw[i] = y[i] * sw;
    }

    solve_least_squares(&xw, &yw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn weighted_solve_recovers_exact_parabola() {
        let xs = [-2.0, -1.0, 0.0, 1.0, 2.0];
        let rows: Vec<Vec<f64>> = xs.iter().map(|&x| vec![1.0, x, x * x]).collect();
        let y: Vec<f64> = xs.iter().map(|&x| 1.0 - 0.5 * x + 0.25 * x * x).collect();
        let w = [1.0, 4.0, 9.0, 4.0, 1.0];

        let beta = solve_weighted_least_squares(&rows, &y, &w).unwrap();
        assert!((beta[0] - 1.0).abs() < 1e-10);
        assert!((beta[1] + 0.5).abs() < 1e-10);
        assert!((beta[2] - 0.25).abs() < 1e-10);
    }

    #[test]
    fn weighted_solve_rejects_underdetermined_input() {
        let rows = vec![vec![1.0, 0.0, 0.0]];
        assert!(solve_weighted_least_squares(&rows, &[1.0], &[1.0]).is_none());
    }
}
