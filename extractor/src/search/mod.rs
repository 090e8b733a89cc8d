pub mod bisect;
pub mod pool;
pub mod sampler;

use stagelight_common::config::SearchConfig;
use stagelight_common::snapshot::StateSnapshot;
use std::sync::Arc;
use tracing::{debug, info};

use crate::extract::color::SimilarityError;
use crate::extract::traits::StateExtractor;
use crate::source::FrameSource;
use bisect::{refine, Refinement};
use sampler::Sampler;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Similarity(#[from] SimilarityError),
    #[error("refinement pair out of order: {prev:.2}s is not before {cur:.2}s")]
    UnorderedPair { prev: f64, cur: f64 },
    #[error("refinement target at {timestamp:.2}s is invalid")]
    InvalidEndpoint { timestamp: f64 },
    #[error("refinement accuracy must be > 0, got {0}")]
    Accuracy(f64),
    #[error("sample step must be >= 1 second, got {0}")]
    Step(u32),
    #[error("at least one search worker is required")]
    NoWorkers,
    #[error("search worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Finds the instants at which the lighting state of a video changes.
///
/// Two passes, each on its own worker pool:
/// 1. Coarse: sample every `step` seconds from 0 to the end of the source
/// 2. Refine: for every adjacent pair of coarse samples whose states differ,
///    bisect the interval down to `accuracy` seconds
///
/// The result starts with the first coarse sample (if valid) followed by one
/// snapshot per detected transition, placed at its refined timestamp. No two
/// consecutive entries describe the same state.
pub struct Search {
    sampler: Sampler,
    length: f64,
    step: u32,
    accuracy: f64,
    workers: usize,
}

impl Search {
    pub fn new(
        extractor: Arc<dyn StateExtractor>,
        source: Arc<dyn FrameSource>,
        config: &SearchConfig,
    ) -> Result<Self, SearchError> {
        if config.step_secs < 1 {
            return Err(SearchError::Step(config.step_secs));
        }
        if config.workers < 1 {
            return Err(SearchError::NoWorkers);
        }
        if !(config.accuracy_secs > 0.0) {
            return Err(SearchError::Accuracy(config.accuracy_secs));
        }
        let length = source.length();
        Ok(Self {
            sampler: Sampler::new(source, extractor),
            length,
            step: config.step_secs,
            accuracy: config.accuracy_secs,
            workers: config.workers,
        })
    }

    pub async fn run(&self) -> Result<Vec<StateSnapshot>, SearchError> {
        let raw = self.coarse_pass().await?;
        self.compact(&raw).await
    }

    /// Instants visited by the coarse pass: `0, step, 2*step, ...` up to the
    /// whole seconds of the source length.
    pub fn sample_times(&self) -> Vec<f64> {
        let last = self.length.max(0.0).floor() as u64;
        (0..=last)
            .step_by(self.step as usize)
            .map(|t| t as f64)
            .collect()
    }

    /// One snapshot per sample time, in time order. Never fails on video
    /// content; unusable samples come back invalid.
    pub async fn coarse_pass(&self) -> Result<Vec<StateSnapshot>, SearchError> {
        let times = self.sample_times();
        info!(
            samples = times.len(),
            step = self.step,
            workers = self.workers,
            "starting coarse pass"
        );

        let sampler = self.sampler.clone();
        let raw = pool::ordered_map(times, self.workers, move |t| sampler.sample(t)).await?;

        let valid = raw.iter().filter(|s| s.is_valid()).count();
        info!(samples = raw.len(), valid, "coarse pass finished");
        Ok(raw)
    }

    /// Reduce coarse samples to the initial state plus one entry per
    /// transition, refining each transition's timestamp.
    ///
    /// A sample is a transition when it differs from the last state kept so
    /// far, so a state interrupted by invalid samples is reported once. The
    /// bisection still runs from the sample right before it.
    pub async fn compact(&self, raw: &[StateSnapshot]) -> Result<Vec<StateSnapshot>, SearchError> {
        let mut last_kept = raw.first().filter(|s| s.is_valid());
        let mut pairs = Vec::new();
        for window in raw.windows(2) {
            let (prev, cur) = (&window[0], &window[1]);
            if !cur.is_valid() {
                continue;
            }
            if let Some(last) = last_kept {
                if self.sampler.similar(last, cur)? {
                    debug!(
                        t = cur.timestamp(),
                        since = last.timestamp(),
                        "similar to last kept state"
                    );
                    continue;
                }
            }
            pairs.push((prev.clone(), cur.clone()));
            last_kept = Some(cur);
        }
        info!(
            transitions = pairs.len(),
            accuracy = self.accuracy,
            "starting refinement pass"
        );

        let targets: Vec<StateSnapshot> = pairs.iter().map(|(_, cur)| cur.clone()).collect();
        let sampler = self.sampler.clone();
        let accuracy = self.accuracy;
        let outcomes = pool::ordered_map(pairs, self.workers, move |(prev, cur)| {
            refine(&sampler, prev, cur, accuracy)
        })
        .await?;

        let mut updates = Vec::with_capacity(targets.len() + 1);
        if let Some(first) = raw.first().filter(|s| s.is_valid()) {
            updates.push(first.clone());
        }
        let mut ambiguous = 0usize;
        for (target, outcome) in targets.into_iter().zip(outcomes) {
            let outcome = outcome?;
            if matches!(outcome, Refinement::Ambiguous(_)) {
                ambiguous += 1;
            }
            updates.push(target.at(outcome.timestamp()));
        }

        info!(updates = updates.len(), ambiguous, "refinement pass finished");
        Ok(updates)
    }
}
