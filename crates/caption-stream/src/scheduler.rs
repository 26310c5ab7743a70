//! Cost-bounded recomputation of the boxes most likely to flip.
//!
//! Candidates are processed in fixed-size batches. A sliding window of
//! "did the label flip" outcomes decides when the remaining candidates are no
//! longer worth recomputing: at a true 2% flip rate a 100-sample window has a
//! standard error of roughly 1.4%.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::change::RankedCandidate;

pub const BATCH_SIZE: usize = 50;
pub const REVERSAL_WINDOW_SIZE: usize = 100;
pub const MIN_BOXES_BEFORE_CHECK: usize = 50;
pub const REVERSAL_RATE_THRESHOLD: f64 = 0.02;
pub const MAX_BOXES_PER_UPDATE: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecalcConfig {
    pub batch_size: usize,
    pub reversal_window: usize,
    pub min_boxes_before_check: usize,
    pub reversal_threshold: f64,
    pub max_boxes_per_update: usize,
}

impl Default for RecalcConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            reversal_window: REVERSAL_WINDOW_SIZE,
            min_boxes_before_check: MIN_BOXES_BEFORE_CHECK,
            reversal_threshold: REVERSAL_RATE_THRESHOLD,
            max_boxes_per_update: MAX_BOXES_PER_UPDATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ReversalRate,
    Exhausted,
    MaxBoxes,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::ReversalRate => "reversal_rate",
            StopReason::Exhausted => "exhausted",
            StopReason::MaxBoxes => "max_boxes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalcStats {
    pub total_processed: usize,
    pub total_reversals: usize,
    pub final_reversal_rate: f64,
    pub stopped_early: bool,
    pub reason: StopReason,
}

#[derive(Debug, Error)]
pub enum RecalcError<E> {
    #[error("batch recompute failed after {processed} boxes")]
    Batch {
        processed: usize,
        #[source]
        source: E,
    },
    #[error("batch of {expected} boxes reported {actual} outcomes")]
    OutcomeCount { expected: usize, actual: usize },
}

/// Rolling record of the most recent flip outcomes.
#[derive(Debug, Clone)]
pub struct ReversalWindow {
    outcomes: VecDeque<bool>,
    capacity: usize,
    flips: usize,
}

impl ReversalWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
            flips: 0,
        }
    }

    pub fn push(&mut self, flipped: bool) {
        if self.outcomes.len() == self.capacity {
            if let Some(true) = self.outcomes.pop_front() {
                self.flips -= 1;
            }
        }
        self.outcomes.push_back(flipped);
        if flipped {
            self.flips += 1;
        }
    }

    pub fn is_full(&self) -> bool {
        self.outcomes.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.0
        } else {
            self.flips as f64 / self.outcomes.len() as f64
        }
    }
}

/// Runs `recompute` over `candidates` batch by batch until the flip rate
/// settles, the candidates run out, or the per-update cap is hit.
///
/// `recompute` receives one batch and reports, per box and in order, whether
/// its label changed. Control is yielded back to the runtime between batches.
pub async fn adaptive_recalculate<F, E>(
    candidates: &[RankedCandidate],
    config: &RecalcConfig,
    mut recompute: F,
) -> Result<RecalcStats, RecalcError<E>>
where
    F: FnMut(&[RankedCandidate]) -> Result<Vec<bool>, E>,
{
    let batch_size = config.batch_size.max(1);
    let limit = candidates.len().min(config.max_boxes_per_update);
    let mut window = ReversalWindow::new(config.reversal_window);
    let mut processed = 0usize;
    let mut reversals = 0usize;

    let reason = loop {
        if processed >= limit {
            break if processed >= candidates.len() {
                StopReason::Exhausted
            } else {
                StopReason::MaxBoxes
            };
        }

        let end = (processed + batch_size).min(limit);
        let batch = &candidates[processed..end];
        let outcomes =
            recompute(batch).map_err(|source| RecalcError::Batch { processed, source })?;
        if outcomes.len() != batch.len() {
            return Err(RecalcError::OutcomeCount {
                expected: batch.len(),
                actual: outcomes.len(),
            });
        }

        let batch_flips = outcomes.iter().filter(|&&flipped| flipped).count();
        for flipped in outcomes {
            window.push(flipped);
        }
        processed = end;
        reversals += batch_flips;
        log::debug!(
            "recalculated {} boxes ({} flipped), window rate {:.3}",
            batch.len(),
            batch_flips,
            window.rate()
        );

        if processed < candidates.len()
            && window.is_full()
            && processed >= config.min_boxes_before_check
            && window.rate() < config.reversal_threshold
        {
            break StopReason::ReversalRate;
        }

        if processed < limit {
            tokio::task::yield_now().await;
        }
    };

    let stats = RecalcStats {
        total_processed: processed,
        total_reversals: reversals,
        final_reversal_rate: window.rate(),
        stopped_early: reason == StopReason::ReversalRate,
        reason,
    };
    log::debug!(
        "recalculation stopped ({}): {} processed, {} reversals",
        reason.as_str(),
        stats.total_processed,
        stats.total_reversals
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Candidate;
    use caption_types::{BoxId, FeatureVector, Label};

    fn ranked(count: usize) -> Vec<RankedCandidate> {
        (0..count)
            .map(|i| RankedCandidate {
                candidate: Candidate {
                    id: BoxId::new(i as u64, 0),
                    features: FeatureVector::filled(2, 0.0),
                    label: Label::Out,
                    confidence: 0.6,
                },
                probability: 1.0 - i as f64 / (count as f64 + 1.0),
            })
            .collect()
    }

    #[derive(Debug, Error)]
    #[error("store unavailable")]
    struct StoreDown;

    #[test]
    fn window_drops_oldest_outcome() {
        let mut window = ReversalWindow::new(3);
        window.push(true);
        window.push(false);
        window.push(false);
        assert!(window.is_full());
        assert!((window.rate() - 1.0 / 3.0).abs() < 1e-12);
        window.push(false);
        assert_eq!(window.rate(), 0.0);
        assert_eq!(window.len(), 3);
    }

    #[tokio::test]
    async fn zero_flip_stream_stops_on_reversal_rate() {
        let candidates = ranked(1000);
        let config = RecalcConfig::default();
        let stats = adaptive_recalculate(&candidates, &config, |batch| {
            Ok::<_, StoreDown>(vec![false; batch.len()])
        })
        .await
        .unwrap();
        assert_eq!(stats.reason, StopReason::ReversalRate);
        assert!(stats.stopped_early);
        assert!(stats.total_processed <= MIN_BOXES_BEFORE_CHECK + REVERSAL_WINDOW_SIZE);
        assert_eq!(stats.total_reversals, 0);
        assert_eq!(stats.final_reversal_rate, 0.0);
    }

    #[tokio::test]
    async fn flipping_stream_runs_to_exhaustion() {
        let candidates = ranked(230);
        let mut batches = Vec::new();
        let stats = adaptive_recalculate(&candidates, &RecalcConfig::default(), |batch| {
            batches.push(batch.len());
            Ok::<_, StoreDown>(batch.iter().map(|_| true).collect())
        })
        .await
        .unwrap();
        assert_eq!(batches, vec![50, 50, 50, 50, 30]);
        assert_eq!(stats.reason, StopReason::Exhausted);
        assert!(!stats.stopped_early);
        assert_eq!(stats.total_processed, 230);
        assert_eq!(stats.total_reversals, 230);
        assert_eq!(stats.final_reversal_rate, 1.0);
    }

    #[tokio::test]
    async fn steady_flips_hit_the_cap() {
        let candidates = ranked(3000);
        let mut seen = 0usize;
        let stats = adaptive_recalculate(&candidates, &RecalcConfig::default(), |batch| {
            let outcomes = batch.iter().map(|_| {
                seen += 1;
                seen % 10 == 0
            });
            Ok::<_, StoreDown>(outcomes.collect())
        })
        .await
        .unwrap();
        assert_eq!(stats.reason, StopReason::MaxBoxes);
        assert_eq!(stats.total_processed, MAX_BOXES_PER_UPDATE);
        assert_eq!(stats.total_reversals, 200);
        assert!((stats.final_reversal_rate - 0.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn empty_candidates_are_exhausted_immediately() {
        let stats = adaptive_recalculate(&[], &RecalcConfig::default(), |_| {
            Ok::<Vec<bool>, StoreDown>(Vec::new())
        })
        .await
        .unwrap();
        assert_eq!(stats.total_processed, 0);
        assert_eq!(stats.reason, StopReason::Exhausted);
    }

    #[tokio::test]
    async fn batch_errors_carry_progress() {
        let candidates = ranked(200);
        let mut calls = 0;
        let err = adaptive_recalculate(&candidates, &RecalcConfig::default(), |batch| {
            calls += 1;
            if calls == 3 {
                Err(StoreDown)
            } else {
                Ok(vec![true; batch.len()])
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RecalcError::Batch { processed: 100, .. }));
    }

    #[tokio::test]
    async fn short_outcome_lists_are_rejected() {
        let candidates = ranked(10);
        let err = adaptive_recalculate(&candidates, &RecalcConfig::default(), |_| {
            Ok::<_, StoreDown>(vec![false; 3])
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            RecalcError::OutcomeCount {
                expected: 10,
                actual: 3
            }
        ));
    }
}
