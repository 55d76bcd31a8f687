//! Per-event control flow: select → classify → gate → enumerate → minimize → emit.

use serde::Serialize;
use tracing::debug;

use crate::domain::{DecayChannel, Event, Jet, Multiplicities, RecoConfig};
use crate::error::AppError;
use crate::hist::MassSink;
use crate::reco::channel::classify;
use crate::reco::chi2::Score;
use crate::reco::hypothesis::{HypothesisKind, HypothesisSpace};
use crate::reco::minimizer::{Minimizer, ScoredCandidate};
use crate::reco::select::{partition_by_tag, rank_and_truncate, select};

/// Why an event produced no reconstruction. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case", tag = "reason")]
pub enum SkipReason {
    TooFewJets { selected: usize },
    TagWindow { tagged: usize },
    NoPathway { channel: DecayChannel },
    NoCandidates { channel: DecayChannel },
}

/// The winning assignment of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionResult {
    pub entry: usize,
    pub channel: DecayChannel,
    pub kind: HypothesisKind,
    pub multiplicities: Multiplicities,
    /// Size of the searched hypothesis space.
    pub candidates: usize,
    /// Rank-truncated jet pool the candidate indexes into.
    pub pool: Vec<Jet>,
    pub best: ScoredCandidate,
}

impl ReconstructionResult {
    pub fn score(&self) -> &Score {
        &self.best.score
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Reconstructed(ReconstructionResult),
    Skipped(SkipReason),
}

/// The three output accumulators fed by the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct MassSinks<S> {
    pub w_boson: S,
    pub top_quark: S,
    pub exotic: S,
}

impl<S: MassSink> MassSinks<S> {
    /// Two W entries, two top entries, one exotic entry.
    pub fn fill(&mut self, score: &Score) {
        self.w_boson.fill(score.w1);
        self.w_boson.fill(score.w2);
        self.top_quark.fill(score.t1);
        self.top_quark.fill(score.t2);
        self.exotic.fill(score.phi);
    }
}

/// Reconstruct one event and fill `sinks` with the winning masses.
///
/// Filtering outcomes come back as `EventOutcome::Skipped` and leave the
/// sinks untouched; only worker failures are errors.
pub fn reconstruct_event<S: MassSink>(
    event: &Event,
    config: &RecoConfig,
    minimizer: &Minimizer,
    sinks: &mut MassSinks<S>,
) -> Result<EventOutcome, AppError> {
    let cuts = &config.cuts;

    let selected: Vec<Jet> = select(&event.jets, cuts.jet_pt_min, cuts.jet_eta_max)
        .copied()
        .collect();
    if selected.len() < cuts.min_selected_jets {
        return Ok(EventOutcome::Skipped(SkipReason::TooFewJets {
            selected: selected.len(),
        }));
    }

    let (tagged, untagged) = partition_by_tag(&selected);
    let leptons = event.leptons();
    let multiplicities = Multiplicities {
        leptons: leptons.len(),
        selected_jets: selected.len(),
        untagged_jets: untagged.len(),
        tagged_jets: tagged.len(),
    };
    let channel = classify(multiplicities);

    if !(cuts.min_tagged_jets..=cuts.max_tagged_jets).contains(&tagged.len()) {
        return Ok(EventOutcome::Skipped(SkipReason::TagWindow {
            tagged: tagged.len(),
        }));
    }

    let Some(kind) = channel.pathway() else {
        return Ok(EventOutcome::Skipped(SkipReason::NoPathway { channel }));
    };

    let pool = rank_and_truncate(&selected, kind.jet_slots());
    let space = match kind {
        HypothesisKind::FullHadronic => HypothesisSpace::full_hadronic(&pool)?,
        HypothesisKind::SemiLeptonic => {
            let Some(lepton) = leptons.first() else {
                return Ok(EventOutcome::Skipped(SkipReason::NoPathway { channel }));
            };
            HypothesisSpace::semi_leptonic(&pool, lepton, &event.missing)?
        }
    };

    debug!(
        entry = event.entry,
        channel = channel.display_name(),
        pool = pool.len(),
        candidates = space.len(),
        "searching hypothesis space"
    );

    let Some(best) = minimizer.minimize(&space, &config.masses)? else {
        return Ok(EventOutcome::Skipped(SkipReason::NoCandidates { channel }));
    };

    sinks.fill(&best.score);

    Ok(EventOutcome::Reconstructed(ReconstructionResult {
        entry: event.entry,
        channel,
        kind,
        multiplicities,
        candidates: space.len(),
        pool,
        best,
    }))
}
