//! Object selection: kinematic cuts, tag partitioning and pT ranking.

use crate::domain::{Jet, Kinematic};

/// Lazily keep objects with `pt > pt_min` and `|eta| < eta_max`, in input order.
pub fn select<'a, T: Kinematic>(
    objects: &'a [T],
    pt_min: f64,
    eta_max: f64,
) -> impl Iterator<Item = &'a T> + 'a {
    objects
        .iter()
        .filter(move |o| o.pt() > pt_min && o.eta().abs() < eta_max)
}

/// Split jets into `(tagged, untagged)`, preserving relative order.
pub fn partition_by_tag(jets: &[Jet]) -> (Vec<Jet>, Vec<Jet>) {
    jets.iter().partition(|j| j.tagged)
}

/// Keep the `required + 1` highest-pT jets, sorted by descending pT.
///
/// The extra jet leaves one spare candidate for the enumerator. Pools that are
/// already small enough are returned whole (still sorted). The sort is stable,
/// so equal-pT jets keep their input order.
pub fn rank_and_truncate(jets: &[Jet], required: usize) -> Vec<Jet> {
    let mut ranked = jets.to_vec();
    ranked.sort_by(|a, b| b.pt.partial_cmp(&a.pt).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(required + 1);
    ranked
}
