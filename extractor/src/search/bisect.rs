use stagelight_common::snapshot::StateSnapshot;
use tracing::{debug, warn};

use super::sampler::Sampler;
use super::SearchError;

/// How a refinement task ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Refinement {
    /// The transition was narrowed to an interval shorter than the accuracy;
    /// carries the later end of that interval.
    Converged(f64),
    /// A midpoint matched neither side. Carries the unrefined timestamp.
    Ambiguous(f64),
}

impl Refinement {
    pub fn timestamp(self) -> f64 {
        match self {
            Refinement::Converged(t) | Refinement::Ambiguous(t) => t,
        }
    }
}

enum BisectState {
    /// The transition lies somewhere in `(prev.timestamp, cur.timestamp]`.
    Bisecting {
        prev: StateSnapshot,
        cur: StateSnapshot,
    },
    Done(Refinement),
}

/// Narrow the transition between `prev` and `cur` down to `accuracy` seconds.
///
/// `cur` must be valid and strictly later than `prev`. The loop halves the
/// interval until it is shorter than `accuracy` or cannot be split any more,
/// moving towards whichever side the midpoint resembles; an invalid midpoint
/// counts as "before".
pub fn refine(
    sampler: &Sampler,
    prev: StateSnapshot,
    cur: StateSnapshot,
    accuracy: f64,
) -> Result<Refinement, SearchError> {
    if !(accuracy > 0.0) {
        return Err(SearchError::Accuracy(accuracy));
    }
    if !cur.is_valid() {
        return Err(SearchError::InvalidEndpoint {
            timestamp: cur.timestamp(),
        });
    }
    if !(prev.timestamp() < cur.timestamp()) {
        return Err(SearchError::UnorderedPair {
            prev: prev.timestamp(),
            cur: cur.timestamp(),
        });
    }

    let original = cur.timestamp();
    let mut state = BisectState::Bisecting { prev, cur };
    loop {
        state = match state {
            BisectState::Bisecting { prev, cur } => step(sampler, prev, cur, accuracy, original)?,
            BisectState::Done(outcome) => return Ok(outcome),
        };
    }
}

fn step(
    sampler: &Sampler,
    prev: StateSnapshot,
    cur: StateSnapshot,
    accuracy: f64,
    original: f64,
) -> Result<BisectState, SearchError> {
    if cur.timestamp() - prev.timestamp() < accuracy {
        debug!(
            from = original,
            to = cur.timestamp(),
            "transition converged"
        );
        return Ok(BisectState::Done(Refinement::Converged(cur.timestamp())));
    }

    let t = (prev.timestamp() + cur.timestamp()) / 2.0;
    if t <= prev.timestamp() || t >= cur.timestamp() {
        // Adjacent floats: the interval cannot shrink any further.
        debug!(
            from = original,
            to = cur.timestamp(),
            accuracy,
            "transition converged at float resolution"
        );
        return Ok(BisectState::Done(Refinement::Converged(cur.timestamp())));
    }
    let mid = sampler.sample(t);
    if !mid.is_valid() || sampler.similar(&prev, &mid)? {
        return Ok(BisectState::Bisecting { prev: mid, cur });
    }
    if sampler.similar(&mid, &cur)? {
        return Ok(BisectState::Bisecting { prev, cur: mid });
    }

    warn!(
        prev = prev.timestamp(),
        mid = mid.timestamp(),
        cur = cur.timestamp(),
        reported = original,
        "midpoint matches neither side, refinement did not converge"
    );
    Ok(BisectState::Done(Refinement::Ambiguous(original)))
}
