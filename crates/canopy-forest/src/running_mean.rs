//! Streaming mean accumulator shared between growth workers.

use parking_lot::Mutex;

#[derive(Debug, Default, Clone, Copy)]
struct MeanState {
    mean: f64,
    count: usize,
}

/// Thread-safe running mean and count.
///
/// Every worker that records a split on a feature updates that feature's
/// accumulator, so each instance guards its state with its own lock.
#[derive(Debug, Default)]
pub struct RunningMean {
    state: Mutex<MeanState>,
}

impl RunningMean {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation into the mean.
    pub fn add(&self, value: f64) {
        let mut state = self.state.lock();
        state.count += 1;
        state.mean += (value - state.mean) / state.count as f64;
    }

    /// Return `(mean, count)`. The mean of an empty accumulator is 0.
    #[must_use]
    pub fn read(&self) -> (f64, usize) {
        let state = self.state.lock();
        (state.mean, state.count)
    }
}

/// Allocate `n` empty accumulators, one per feature.
#[must_use]
pub fn running_means(n: usize) -> Vec<RunningMean> {
    (0..n).map(|_| RunningMean::new()).collect()
}
