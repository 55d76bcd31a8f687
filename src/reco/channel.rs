//! Decay-channel classification from object multiplicities.
//!
//! The table is evaluated top-down, first match wins:
//!
//! | condition | channel |
//! |---|---|
//! | jets < 4 | `InsufficientObjects` |
//! | leptons = 0, jets ≥ 8, untagged ≥ 4 | `FullHadronic` |
//! | leptons = 1, jets ≥ 8, untagged ≥ 4 | `AmbiguousHadronicOrSemiLeptonic` |
//! | leptons = 1, jets ≥ 6, untagged ≥ 2 | `SemiLeptonic` |
//! | leptons = 1 | `Unclassified` |
//! | leptons ≥ 2, jets ≥ 8, untagged ≥ 4 | `MultiLeptonAllHadronicCapable` |
//! | leptons ≥ 2, jets ≥ 6, untagged ≥ 2 | `MultiLeptonSemiLeptonicCapable` |
//! | leptons ≥ 2, jets ≥ 4 | `FullLeptonic` |
//! | otherwise | `Unclassified` |

use crate::domain::{DecayChannel, Multiplicities};
use crate::reco::hypothesis::HypothesisKind;

pub fn classify(m: Multiplicities) -> DecayChannel {
    let Multiplicities {
        leptons,
        selected_jets: jets,
        untagged_jets: untagged,
        ..
    } = m;

    if jets < 4 {
        return DecayChannel::InsufficientObjects;
    }

    match leptons {
        0 if jets >= 8 && untagged >= 4 => DecayChannel::FullHadronic,
        0 => DecayChannel::Unclassified,
        1 if jets >= 8 && untagged >= 4 => DecayChannel::AmbiguousHadronicOrSemiLeptonic,
        1 if jets >= 6 && untagged >= 2 => DecayChannel::SemiLeptonic,
        1 => DecayChannel::Unclassified,
        _ if jets >= 8 && untagged >= 4 => DecayChannel::MultiLeptonAllHadronicCapable,
        _ if jets >= 6 && untagged >= 2 => DecayChannel::MultiLeptonSemiLeptonicCapable,
        _ => DecayChannel::FullLeptonic,
    }
}

impl DecayChannel {
    /// Reconstruction hypothesis wired to this channel, if any.
    ///
    /// Only the full-hadronic and semi-leptonic channels are reconstructed.
    /// The remaining channels are classified for bookkeeping and skipped.
    pub fn pathway(self) -> Option<HypothesisKind> {
        match self {
            DecayChannel::FullHadronic => Some(HypothesisKind::FullHadronic),
            DecayChannel::SemiLeptonic => Some(HypothesisKind::SemiLeptonic),
            DecayChannel::AmbiguousHadronicOrSemiLeptonic
            | DecayChannel::MultiLeptonAllHadronicCapable
            | DecayChannel::MultiLeptonSemiLeptonicCapable
            | DecayChannel::FullLeptonic => None,
            DecayChannel::InsufficientObjects | DecayChannel::Unclassified => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(leptons: usize, jets: usize, untagged: usize, tagged: usize) -> Multiplicities {
        Multiplicities {
            leptons,
            selected_jets: jets,
            untagged_jets: untagged,
            tagged_jets: tagged,
        }
    }

    #[test]
    fn decision_table_boundaries() {
        use DecayChannel::*;
        let cases = [
            ((0, 3, 3, 0), InsufficientObjects),
            ((2, 3, 1, 2), InsufficientObjects),
            ((0, 8, 4, 4), FullHadronic),
            ((0, 8, 3, 5), Unclassified),
            ((0, 7, 5, 2), Unclassified),
            ((1, 8, 4, 4), AmbiguousHadronicOrSemiLeptonic),
            ((1, 8, 3, 5), SemiLeptonic),
            ((1, 6, 2, 4), SemiLeptonic),
            ((1, 6, 1, 5), Unclassified),
            ((1, 5, 3, 2), Unclassified),
            ((2, 8, 4, 4), MultiLeptonAllHadronicCapable),
            ((3, 6, 2, 4), MultiLeptonSemiLeptonicCapable),
            ((2, 6, 1, 5), FullLeptonic),
            ((2, 4, 0, 4), FullLeptonic),
        ];
        for ((l, j, u, t), expected) in cases {
            assert_eq!(classify(counts(l, j, u, t)), expected, "counts {l},{j},{u},{t}");
        }
    }

    #[test]
    fn classification_is_pure_over_a_grid() {
        for l in 0..=3 {
            for j in 0..=10 {
                for u in 0..=j {
                    let m = counts(l, j, u, j - u);
                    let first = classify(m);
                    assert_eq!(first, classify(m));
                    // Tagged count never participates.
                    assert_eq!(first, classify(counts(l, j, u, 0)));
                }
            }
        }
    }

    #[test]
    fn only_two_channels_have_pathways() {
        let wired: Vec<DecayChannel> = DecayChannel::ALL
            .into_iter()
            .filter(|c| c.pathway().is_some())
            .collect();
        assert_eq!(wired, vec![DecayChannel::FullHadronic, DecayChannel::SemiLeptonic]);
    }
}
