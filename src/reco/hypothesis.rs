//! Hypothesis enumeration.
//!
//! A decay hypothesis assigns detected objects to fixed roles. Every ordered
//! arrangement (k-permutation without replacement) of the candidate jet pool
//! into the hypothesis' jet slots is one `AssignmentCandidate`.
//!
//! Legs are always laid out in scorer order:
//!
//! ```text
//! leg:   0    1    2   3    4    5   6   7
//! role: W1a  W1b  b1  W2a  W2b  b2  X1  X2
//! ```
//!
//! - full hadronic: all eight legs are jets (slots 0..8 in order)
//! - semi-leptonic: legs 3 and 4 are the lepton and the missing energy;
//!   jet slots 0,1,2 fill legs 0,1,2 and jet slots 3,4,5 fill legs 5,6,7
//!
//! The space is never materialized. Candidates are produced lazily in
//! lexicographic index order, and any contiguous rank range can be entered
//! directly by unranking its first permutation. That is what lets the
//! minimizer hand out chunks to workers without copying the whole space.
//!
//! Enumeration cost is `n! / (n - k)!`. The pool size is therefore a checked
//! precondition: a pool larger than `slots + 1` is rejected.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::domain::{Jet, Lepton, MissingEnergy};
use crate::error::AppError;
use crate::math::FourMomentum;

pub const MAX_LEGS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HypothesisKind {
    /// Both tops decay hadronically; 8 jet slots.
    FullHadronic,
    /// One hadronic top, one leptonic top; 6 jet slots + lepton + missing energy.
    SemiLeptonic,
}

impl HypothesisKind {
    pub fn jet_slots(self) -> usize {
        match self {
            HypothesisKind::FullHadronic => 8,
            HypothesisKind::SemiLeptonic => 6,
        }
    }

    /// Largest candidate pool the enumerator accepts (one spare jet).
    pub fn pool_cap(self) -> usize {
        self.jet_slots() + 1
    }

    pub fn display_name(self) -> &'static str {
        match self {
            HypothesisKind::FullHadronic => "full hadronic",
            HypothesisKind::SemiLeptonic => "semi-leptonic",
        }
    }
}

/// One ordered assignment of objects to decay roles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignmentCandidate {
    /// Position in the canonical enumeration order.
    pub rank: usize,
    /// Pool indices in jet-slot order (first `jet_count` entries are valid).
    pub jets: [usize; MAX_LEGS],
    pub jet_count: usize,
    pub legs: [FourMomentum; MAX_LEGS],
}

impl AssignmentCandidate {
    pub fn jet_indices(&self) -> &[usize] {
        &self.jets[..self.jet_count]
    }
}

/// The finite, restartable space of assignments for one event.
#[derive(Debug, Clone)]
pub struct HypothesisSpace {
    kind: HypothesisKind,
    pool: Vec<FourMomentum>,
    /// Lepton and missing-energy legs of the semi-leptonic hypothesis.
    leptonic: Option<(FourMomentum, FourMomentum)>,
    len: usize,
}

impl HypothesisSpace {
    pub fn full_hadronic(pool: &[Jet]) -> Result<Self, AppError> {
        Self::new(HypothesisKind::FullHadronic, pool, None)
    }

    pub fn semi_leptonic(pool: &[Jet], lepton: &Lepton, missing: &MissingEnergy) -> Result<Self, AppError> {
        Self::new(HypothesisKind::SemiLeptonic, pool, Some((lepton.p4, missing.p4)))
    }

    fn new(
        kind: HypothesisKind,
        pool: &[Jet],
        leptonic: Option<(FourMomentum, FourMomentum)>,
    ) -> Result<Self, AppError> {
        if pool.len() > kind.pool_cap() {
            return Err(AppError::compute(format!(
                "Candidate pool of {} jets exceeds the {} cap of {}; rank-truncate before enumerating.",
                pool.len(),
                kind.display_name(),
                kind.pool_cap()
            )));
        }

        let slots = kind.jet_slots();
        Ok(Self {
            kind,
            pool: pool.iter().map(|j| j.p4).collect(),
            leptonic,
            len: permutation_count(pool.len(), slots),
        })
    }

    pub fn kind(&self) -> HypothesisKind {
        self.kind
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Number of candidates; zero when the pool is smaller than the slot count.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> Candidates<'_> {
        self.range(0..self.len)
    }

    /// Candidates with ranks in `ranks` (clamped to the space).
    pub fn range(&self, ranks: Range<usize>) -> Candidates<'_> {
        let end = ranks.end.min(self.len);
        let start = ranks.start.min(end);
        Candidates {
            space: self,
            next_rank: start,
            end,
            indices: [0; MAX_LEGS],
            positioned: false,
        }
    }

    fn assemble(&self, rank: usize, indices: &[usize]) -> AssignmentCandidate {
        let mut jets = [0usize; MAX_LEGS];
        jets[..indices.len()].copy_from_slice(indices);

        let p = |slot: usize| self.pool[indices[slot]];
        let legs = match self.leptonic {
            None => [p(0), p(1), p(2), p(3), p(4), p(5), p(6), p(7)],
            Some((lepton, missing)) => [p(0), p(1), p(2), lepton, missing, p(3), p(4), p(5)],
        };

        AssignmentCandidate {
            rank,
            jets,
            jet_count: indices.len(),
            legs,
        }
    }
}

impl<'a> IntoIterator for &'a HypothesisSpace {
    type Item = AssignmentCandidate;
    type IntoIter = Candidates<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over a contiguous rank range of a `HypothesisSpace`.
#[derive(Debug, Clone)]
pub struct Candidates<'a> {
    space: &'a HypothesisSpace,
    next_rank: usize,
    end: usize,
    indices: [usize; MAX_LEGS],
    positioned: bool,
}

impl Iterator for Candidates<'_> {
    type Item = AssignmentCandidate;

    fn next(&mut self) -> Option<AssignmentCandidate> {
        if self.next_rank >= self.end {
            return None;
        }

        let n = self.space.pool.len();
        let k = self.space.kind.jet_slots();
        let indices = &mut self.indices[..k];
        if self.positioned {
            let advanced = advance_permutation(indices, n);
            debug_assert!(advanced, "rank range exceeded the permutation space");
        } else {
            unrank_permutation(self.next_rank, n, indices);
            self.positioned = true;
        }

        let candidate = self.space.assemble(self.next_rank, indices);
        self.next_rank += 1;
        Some(candidate)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next_rank;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Candidates<'_> {}

/// `n! / (n - k)!`, or 0 when `k > n`.
pub fn permutation_count(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    ((n - k + 1)..=n).product()
}

/// Write the `rank`-th k-permutation of `0..n` (lexicographic) into `out`.
fn unrank_permutation(mut rank: usize, n: usize, out: &mut [usize]) {
    let k = out.len();
    let mut available: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let block = permutation_count(n - i - 1, k - i - 1);
        let digit = rank / block;
        rank %= block;
        out[i] = available.remove(digit);
    }
}

/// Step `indices` to the next k-permutation of `0..n` in lexicographic order.
///
/// Returns `false` (leaving `indices` unspecified) after the last permutation.
fn advance_permutation(indices: &mut [usize], n: usize) -> bool {
    debug_assert!(n <= 64);
    let k = indices.len();
    let mut used: u64 = indices.iter().fold(0, |acc, &i| acc | (1u64 << i));

    for i in (0..k).rev() {
        used &= !(1u64 << indices[i]);
        let Some(bigger) = (indices[i] + 1..n).find(|&v| used & (1u64 << v) == 0) else {
            continue;
        };
        indices[i] = bigger;
        used |= 1u64 << bigger;

        let mut fill = 0;
        for slot in indices.iter_mut().skip(i + 1) {
            while used & (1u64 << fill) != 0 {
                fill += 1;
            }
            *slot = fill;
            used |= 1u64 << fill;
        }
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LeptonFlavor;

    fn pool(n: usize) -> Vec<Jet> {
        (0..n)
            .map(|i| Jet::from_pt_eta_phi_m(100.0 - i as f64, 0.1 * i as f64, 0.5 * i as f64, 5.0, false))
            .collect()
    }

    /// Reference enumeration: recursive lexicographic k-permutations.
    fn reference_permutations(n: usize, k: usize) -> Vec<Vec<usize>> {
        fn rec(n: usize, k: usize, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
            if prefix.len() == k {
                out.push(prefix.clone());
                return;
            }
            for v in 0..n {
                if !prefix.contains(&v) {
                    prefix.push(v);
                    rec(n, k, prefix, out);
                    prefix.pop();
                }
            }
        }
        let mut out = Vec::new();
        rec(n, k, &mut Vec::new(), &mut out);
        out
    }

    #[test]
    fn counts_match_factorial_formula() {
        assert_eq!(permutation_count(9, 8), 362_880);
        assert_eq!(permutation_count(7, 6), 5_040);
        assert_eq!(permutation_count(6, 6), 720);
        assert_eq!(permutation_count(5, 6), 0);
    }

    #[test]
    fn enumeration_matches_reference_order() {
        let jets = pool(7);
        let lepton = Lepton::from_pt_eta_phi_m(LeptonFlavor::Muon, 40.0, 0.2, 1.0, 0.0);
        let missing = MissingEnergy::new(35.0, 0.0, -2.0);
        let space = HypothesisSpace::semi_leptonic(&jets, &lepton, &missing).unwrap();

        let expected = reference_permutations(7, 6);
        let got: Vec<Vec<usize>> = space.iter().map(|c| c.jet_indices().to_vec()).collect();
        assert_eq!(got, expected);
        assert_eq!(space.len(), expected.len());
    }

    #[test]
    fn ranges_resume_mid_sequence() {
        let jets = pool(7);
        let lepton = Lepton::from_pt_eta_phi_m(LeptonFlavor::Electron, 40.0, 0.2, 1.0, 0.0);
        let missing = MissingEnergy::new(35.0, 0.0, -2.0);
        let space = HypothesisSpace::semi_leptonic(&jets, &lepton, &missing).unwrap();

        let all: Vec<AssignmentCandidate> = space.iter().collect();
        for (start, end) in [(0, 1), (17, 400), (719, 721), (5_000, 5_040), (4_000, 9_999)] {
            let slice: Vec<AssignmentCandidate> = space.range(start..end).collect();
            let end = end.min(all.len());
            assert_eq!(slice.as_slice(), &all[start..end]);
        }
    }

    #[test]
    fn iteration_is_restartable() {
        let space = HypothesisSpace::full_hadronic(&pool(8)).unwrap();
        let first: Vec<usize> = space.iter().map(|c| c.rank).collect();
        let second: Vec<usize> = (&space).into_iter().map(|c| c.rank).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 40_320);
    }

    #[test]
    fn semi_leptonic_legs_place_lepton_and_missing_energy() {
        let jets = pool(6);
        let lepton = Lepton::from_pt_eta_phi_m(LeptonFlavor::Electron, 40.0, 0.2, 1.0, 0.0);
        let missing = MissingEnergy::new(35.0, 0.0, -2.0);
        let space = HypothesisSpace::semi_leptonic(&jets, &lepton, &missing).unwrap();

        let c = space.iter().nth(3).unwrap();
        let idx = c.jet_indices();
        assert_eq!(idx.len(), 6);
        assert_eq!(c.legs[0], jets[idx[0]].p4);
        assert_eq!(c.legs[2], jets[idx[2]].p4);
        assert_eq!(c.legs[3], lepton.p4);
        assert_eq!(c.legs[4], missing.p4);
        assert_eq!(c.legs[5], jets[idx[3]].p4);
        assert_eq!(c.legs[7], jets[idx[5]].p4);
    }

    #[test]
    fn no_jet_repeats_within_a_candidate() {
        let space = HypothesisSpace::full_hadronic(&pool(9)).unwrap();
        for c in space.range(100_000..101_000) {
            let mut seen = [false; 9];
            for &i in c.jet_indices() {
                assert!(!seen[i]);
                seen[i] = true;
            }
        }
    }

    #[test]
    fn undersized_pool_yields_nothing() {
        let space = HypothesisSpace::full_hadronic(&pool(7)).unwrap();
        assert!(space.is_empty());
        assert_eq!(space.iter().count(), 0);
    }

    #[test]
    fn oversized_pool_is_rejected() {
        let err = HypothesisSpace::full_hadronic(&pool(10)).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
