//! Chi-squared scoring of one assignment.
//!
//! ```text
//! W1  = m(W1a + W1b)          t1 = m(W1a + W1b + b1)
//! W2  = m(W2a + W2b)          t2 = m(W2a + W2b + b2)
//! phi = m(X1 + X2)
//!
//! chi2 = (W1 - mW)²/σW² + (W2 - mW)²/σW² + (t1 - mt)²/σt² + (t2 - mt)²/σt²
//!      + λX · (phi - mX)²/σX²
//! ```
//!
//! `λX` is `MassHypothesis::exotic_weight` (0 by default), so `phi` is
//! reported without steering the choice of assignment.

use serde::{Deserialize, Serialize};

use crate::domain::MassHypothesis;
use crate::reco::hypothesis::AssignmentCandidate;

/// Score and derived masses of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub chi2: f64,
    pub w1: f64,
    pub w2: f64,
    pub t1: f64,
    pub t2: f64,
    pub phi: f64,
}

/// Stateless scoring function shared by all minimizer workers.
pub trait Scorer: Sync {
    fn score(&self, candidate: &AssignmentCandidate) -> Score;
}

impl Scorer for MassHypothesis {
    fn score(&self, candidate: &AssignmentCandidate) -> Score {
        score(self, candidate)
    }
}

impl<F> Scorer for F
where
    F: Fn(&AssignmentCandidate) -> Score + Sync,
{
    fn score(&self, candidate: &AssignmentCandidate) -> Score {
        self(candidate)
    }
}

pub fn score(masses: &MassHypothesis, candidate: &AssignmentCandidate) -> Score {
    let l = &candidate.legs;

    let w1_p4 = l[0] + l[1];
    let w2_p4 = l[3] + l[4];
    let w1 = w1_p4.mass();
    let w2 = w2_p4.mass();
    let t1 = (w1_p4 + l[2]).mass();
    let t2 = (w2_p4 + l[5]).mass();
    let phi = (l[6] + l[7]).mass();

    let pull = |m: f64, mean: f64, sigma: f64| {
        let d = m - mean;
        d * d / (sigma * sigma)
    };

    let mut chi2 = pull(w1, masses.w_mass, masses.w_sigma)
        + pull(w2, masses.w_mass, masses.w_sigma)
        + pull(t1, masses.top_mass, masses.top_sigma)
        + pull(t2, masses.top_mass, masses.top_sigma);
    if masses.exotic_weight != 0.0 {
        chi2 += masses.exotic_weight * pull(phi, masses.exotic_mass, masses.exotic_sigma);
    }

    Score {
        chi2,
        w1,
        w2,
        t1,
        t2,
        phi,
    }
}
