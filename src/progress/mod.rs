//! Mapping of streamed chunks onto the overall 0-100 progress scale.
//!
//! The server never reports how much work a stage has left, so progress inside a stage
//! is an estimate: each received chunk advances the value by a fixed share of the
//! stage's range, assuming a constant total chunk count. The only hard guarantees are
//! that values never decrease, stay within the stage range, and land exactly on the
//! range end when the stage's stream completes.

use serde::{Deserialize, Serialize};

/// Assumed number of chunks in a stage when no better estimate is configured
pub const DEFAULT_CHUNK_ESTIMATE: u32 = 100;

/// Lower bound of the overall progress scale
pub const PROGRESS_MIN: f64 = 0.0;

/// Upper bound of the overall progress scale
pub const PROGRESS_MAX: f64 = 100.0;

/// A closed sub-range of the overall progress scale assigned to one stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageRange {
    pub start: f64,
    pub end: f64,
}

impl StageRange {
    /// Create a range, clamping both bounds into [0, 100] and ordering them
    pub fn new(start: f64, end: f64) -> Self {
        let start = start.clamp(PROGRESS_MIN, PROGRESS_MAX);
        let end = end.clamp(PROGRESS_MIN, PROGRESS_MAX);
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    pub fn span(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.start && value <= self.end
    }
}

/// Per-stage chunk counter, created fresh for every stage invocation
#[derive(Debug, Clone)]
pub struct StageProgress {
    range: StageRange,
    chunk_estimate: u32,
    chunks: u32,
}

impl StageProgress {
    pub fn new(range: StageRange, chunk_estimate: u32) -> Self {
        Self {
            range,
            chunk_estimate: chunk_estimate.max(1),
            chunks: 0,
        }
    }

    /// Value before any chunk has arrived
    pub fn initial(&self) -> f64 {
        self.range.start
    }

    /// Record one received chunk and return the estimated progress
    pub fn on_chunk(&mut self) -> f64 {
        self.chunks = self.chunks.saturating_add(1);
        let ratio = (self.chunks as f64 / self.chunk_estimate as f64).min(1.0);
        self.range.start + self.range.span() * ratio
    }

    /// The stage's stream completed; always lands on the range end
    pub fn complete(self) -> f64 {
        self.range.end
    }

    pub fn chunks(&self) -> u32 {
        self.chunks
    }
}

/// Overall progress of one pipeline run
///
/// Only the orchestrator running the pipeline writes to this value; everyone else sees
/// the numbers it publishes in pipeline events.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressState {
    value: f64,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move progress forward; lower values are ignored
    pub fn advance(&mut self, value: f64) -> f64 {
        let value = value.clamp(PROGRESS_MIN, PROGRESS_MAX);
        if value > self.value {
            self.value = value;
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_stage(range: StageRange, chunks: usize, estimate: u32) -> Vec<f64> {
        let mut stage = StageProgress::new(range, estimate);
        let mut values: Vec<f64> = (0..chunks).map(|_| stage.on_chunk()).collect();
        values.push(stage.complete());
        values
    }

    #[test]
    fn test_stage_values_are_monotonic_and_bounded() {
        let ranges = [
            StageRange::new(0.0, 20.0),
            StageRange::new(20.0, 60.0),
            StageRange::new(60.0, 100.0),
            StageRange::new(42.0, 42.0),
        ];

        for range in ranges {
            for chunks in [0, 1, 2, 3, 50, 99, 100, 101, 250] {
                let values = run_stage(range, chunks, DEFAULT_CHUNK_ESTIMATE);

                assert!(values.windows(2).all(|w| w[0] <= w[1]), "{:?} {}", range, chunks);
                assert!(values.iter().all(|v| range.contains(*v)), "{:?} {}", range, chunks);
                assert_eq!(*values.last().unwrap(), range.end);
            }
        }
    }

    #[test]
    fn test_completion_with_zero_chunks_reaches_end() {
        let stage = StageProgress::new(StageRange::new(20.0, 60.0), 100);
        assert_eq!(stage.initial(), 20.0);
        assert_eq!(stage.complete(), 60.0);
    }

    #[test]
    fn test_progress_saturates_past_estimate() {
        let mut stage = StageProgress::new(StageRange::new(0.0, 10.0), 4);
        let values: Vec<f64> = (0..6).map(|_| stage.on_chunk()).collect();
        assert_eq!(values, vec![2.5, 5.0, 7.5, 10.0, 10.0, 10.0]);
        assert_eq!(stage.chunks(), 6);
    }

    #[test]
    fn test_zero_estimate_is_treated_as_one() {
        let mut stage = StageProgress::new(StageRange::new(0.0, 50.0), 0);
        assert_eq!(stage.on_chunk(), 50.0);
    }

    #[test]
    fn test_range_is_clamped_and_ordered() {
        let range = StageRange::new(120.0, -5.0);
        assert_eq!(range, StageRange { start: 0.0, end: 100.0 });
    }

    #[test]
    fn test_progress_state_never_regresses() {
        let mut state = ProgressState::new();
        assert_eq!(state.value(), PROGRESS_MIN);
        assert_eq!(state.advance(30.0), 30.0);
        assert_eq!(state.advance(10.0), 30.0);
        assert_eq!(state.advance(150.0), 100.0);
        assert_eq!(state.value(), PROGRESS_MAX);
    }
}
