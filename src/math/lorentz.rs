//! Four-momentum algebra.
//!
//! Four-momenta are stored in Cartesian form `(E, px, py, pz)` in GeV so that
//! summing the daughters of a decay hypothesis is plain component addition.
//! Collider-native coordinates `(pT, η, φ, m)` are converted once on input.
//!
//! The invariant mass follows the usual detector-analysis convention: for a
//! spacelike sum (`m² < 0`, possible with mismeasured objects) it returns
//! `-sqrt(-m²)` instead of NaN, so every candidate stays comparable.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FourMomentum {
    pub e: f64,
    pub px: f64,
    pub py: f64,
    pub pz: f64,
}

impl FourMomentum {
    pub const ZERO: FourMomentum = FourMomentum {
        e: 0.0,
        px: 0.0,
        py: 0.0,
        pz: 0.0,
    };

    pub fn new(e: f64, px: f64, py: f64, pz: f64) -> Self {
        Self { e, px, py, pz }
    }

    /// Build from transverse momentum, pseudorapidity, azimuth and mass.
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, m: f64) -> Self {
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p2 = px * px + py * py + pz * pz;
        let e = if m >= 0.0 {
            (p2 + m * m).sqrt()
        } else {
            (p2 - m * m).max(0.0).sqrt()
        };
        Self { e, px, py, pz }
    }

    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    pub fn p2(&self) -> f64 {
        self.px * self.px + self.py * self.py + self.pz * self.pz
    }

    /// Pseudorapidity; `±inf` along the beam axis, 0 for a null vector.
    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt == 0.0 {
            return match self.pz.partial_cmp(&0.0) {
                Some(std::cmp::Ordering::Greater) => f64::INFINITY,
                Some(std::cmp::Ordering::Less) => f64::NEG_INFINITY,
                _ => 0.0,
            };
        }
        (self.pz / pt).asinh()
    }

    pub fn phi(&self) -> f64 {
        if self.px == 0.0 && self.py == 0.0 {
            0.0
        } else {
            self.py.atan2(self.px)
        }
    }

    /// All components and `m²` are finite.
    pub fn is_finite(&self) -> bool {
        [self.e, self.px, self.py, self.pz].iter().all(|c| c.is_finite()) && self.m2().is_finite()
    }

    /// Squared invariant mass `E² − |p|²`.
    pub fn m2(&self) -> f64 {
        self.e * self.e - self.p2()
    }

    /// Invariant mass, signed for spacelike vectors.
    pub fn mass(&self) -> f64 {
        let m2 = self.m2();
        if m2 < 0.0 { -(-m2).sqrt() } else { m2.sqrt() }
    }
}

impl Add for FourMomentum {
    type Output = FourMomentum;

    fn add(self, rhs: FourMomentum) -> FourMomentum {
        FourMomentum {
            e: self.e + rhs.e,
            px: self.px + rhs.px,
            py: self.py + rhs.py,
            pz: self.pz + rhs.pz,
        }
    }
}

impl AddAssign for FourMomentum {
    fn add_assign(&mut self, rhs: FourMomentum) {
        *self = *self + rhs;
    }
}

impl Sum for FourMomentum {
    fn sum<I: Iterator<Item = FourMomentum>>(iter: I) -> Self {
        iter.fold(FourMomentum::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a FourMomentum> for FourMomentum {
    fn sum<I: Iterator<Item = &'a FourMomentum>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Invariant mass of the sum of several four-momenta.
pub fn invariant_mass(parts: &[FourMomentum]) -> f64 {
    parts.iter().sum::<FourMomentum>().mass()
}
