//! Parallel chunked minimization over a hypothesis space.
//!
//! The rank space `0..N` is cut into ⌈N/W⌉-sized contiguous chunks. Each chunk
//! is scanned independently on the rayon pool, keeping the lowest chi-squared
//! with the first-encountered candidate winning ties. The chunk minima are
//! collected in chunk order (join barrier) and reduced with the same rule.
//!
//! Because the chunks are contiguous and reduced in order, the result is the
//! one a single sequential scan would give, whatever the chunk count, worker
//! count or completion order.
//!
//! A non-finite score is treated as a worker failure: it aborts the whole
//! reconstruction and is propagated to the caller.

use std::ops::Range;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::AppError;
use crate::reco::chi2::{Score, Scorer};
use crate::reco::hypothesis::{AssignmentCandidate, HypothesisSpace};

pub const DEFAULT_WORKERS: usize = 4;

/// A candidate together with its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: AssignmentCandidate,
    pub score: Score,
}

impl ScoredCandidate {
    fn beats(&self, other: &ScoredCandidate) -> bool {
        self.score.chi2 < other.score.chi2
    }
}

/// Fixed-size worker pool searching hypothesis spaces.
pub struct Minimizer {
    pool: ThreadPool,
    workers: usize,
}

impl std::fmt::Debug for Minimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Minimizer").field("workers", &self.workers).finish()
    }
}

impl Minimizer {
    pub fn new(workers: usize) -> Result<Self, AppError> {
        if workers == 0 {
            return Err(AppError::input("Worker count must be >= 1."));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("reco-worker-{i}"))
            .build()
            .map_err(|e| AppError::compute(format!("Failed to start worker pool: {e}")))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Global minimum over `space`, one chunk per worker.
    pub fn minimize<S: Scorer>(
        &self,
        space: &HypothesisSpace,
        scorer: &S,
    ) -> Result<Option<ScoredCandidate>, AppError> {
        self.minimize_chunked(space, scorer, self.workers)
    }

    /// Global minimum over `space` split into `chunks` contiguous pieces.
    pub fn minimize_chunked<S: Scorer>(
        &self,
        space: &HypothesisSpace,
        scorer: &S,
        chunks: usize,
    ) -> Result<Option<ScoredCandidate>, AppError> {
        if space.is_empty() {
            return Ok(None);
        }

        let ranges = chunk_ranges(space.len(), chunks);
        let minima: Vec<Option<ScoredCandidate>> = self.pool.install(|| {
            ranges
                .par_iter()
                .map(|ranks| scan(space.range(ranks.clone()), scorer))
                .collect::<Result<Vec<_>, AppError>>()
        })?;

        Ok(reduce(minima.into_iter().flatten()))
    }
}

/// Reference single-threaded scan over the whole space.
pub fn minimize_sequential<S: Scorer>(
    space: &HypothesisSpace,
    scorer: &S,
) -> Result<Option<ScoredCandidate>, AppError> {
    scan(space.iter(), scorer)
}

/// Split `0..n` into contiguous ranges of `⌈n / chunks⌉` ranks.
pub fn chunk_ranges(n: usize, chunks: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let size = n.div_ceil(chunks.max(1));
    (0..n).step_by(size).map(|start| start..(start + size).min(n)).collect()
}

fn scan<S, I>(candidates: I, scorer: &S) -> Result<Option<ScoredCandidate>, AppError>
where
    S: Scorer + ?Sized,
    I: Iterator<Item = AssignmentCandidate>,
{
    let mut best: Option<ScoredCandidate> = None;
    for candidate in candidates {
        let score = scorer.score(&candidate);
        if !score.chi2.is_finite() {
            return Err(AppError::compute(format!(
                "Non-finite chi-squared ({}) for candidate rank {}.",
                score.chi2, candidate.rank
            )));
        }
        let scored = ScoredCandidate { candidate, score };
        if best.as_ref().is_none_or(|b| scored.beats(b)) {
            best = Some(scored);
        }
    }
    Ok(best)
}

fn reduce(minima: impl Iterator<Item = ScoredCandidate>) -> Option<ScoredCandidate> {
    minima.fold(None, |best, next| match best {
        Some(b) if !next.beats(&b) => Some(b),
        _ => Some(next),
    })
}
