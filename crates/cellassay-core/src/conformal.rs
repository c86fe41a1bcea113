//! Conformal Prediction for distribution-free prediction intervals.
//!
//! Given a stream of observations, produces prediction intervals with
//! guaranteed coverage: the next observation falls within the interval
//! with probability >= `coverage`, regardless of the underlying distribution.
//!
//! Uses split conformal prediction with a sliding calibration window.
//!
//! # References
//!
//! Vovk, V., Gammerman, A., & Shafer, G. (2005). *Algorithmic Learning
//! in a Random World*. Springer.

use std::collections::VecDeque;

/// Minimum calibration window size before predictions are emitted.
const MIN_CALIBRATION: usize = 30;

/// A prediction interval with coverage guarantee.
#[derive(Debug, Clone)]
pub struct PredictionInterval {
    /// Lower bound of the interval.
    pub lower: f64,
    /// Upper bound of the interval.
    pub upper: f64,
    /// Nominal coverage level (1 - alpha).
    pub coverage: f64,
    /// Number of calibration observations used.
    pub calibration_size: usize,
}

/// Distribution-free conformal predictor using nonconformity scores.
///
/// Maintains a sliding window of recent observations and produces
/// prediction intervals with guaranteed finite-sample coverage.
///
/// # Example
///
/// ```
/// use cellassay_core::conformal::ConformalPredictor;
///
/// let mut predictor = ConformalPredictor::new(100, 0.90);
///
/// // Calibrate with 50 observations
/// for i in 0..50 {
///     predictor.observe(i as f64 * 0.1);
/// }
///
/// // Get prediction interval
/// if let Some(interval) = predictor.predict() {
///     assert!(interval.coverage >= 0.90);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ConformalPredictor {
    /// Recent observations (sliding window).
    observations: VecDeque<f64>,
    /// Maximum calibration window size.
    window: usize,
    /// Coverage level (1 - alpha), e.g., 0.90 for 90% coverage.
    coverage: f64,
    /// Total observations seen (including those that fell out of window).
    total_count: usize,
    /// Count of observations that fell within the predicted interval.
    hits: usize,
    /// Count of observations for which a prediction was available.
    predictions_made: usize,
}

impl ConformalPredictor {
    /// Create a new conformal predictor.
    ///
    /// - `window`: maximum number of recent observations to keep for
    ///   calibration. Larger windows give tighter intervals but adapt
    ///   more slowly to distribution shifts.
    /// - `coverage`: nominal coverage level (e.g., 0.90 for 90%).
    ///   Must be in (0, 1).
    #[must_use]
    pub fn new(window: usize, coverage: f64) -> Self {
        Self {
            observations: VecDeque::with_capacity(window.min(1024)),
            window,
            coverage,
            total_count: 0,
            hits: 0,
            predictions_made: 0,
        }
    }

    /// Observe a new data point and add it to the calibration window.
    ///
    /// Also tracks coverage: if a prediction interval was available
    /// before this observation, checks whether the observation fell
    /// within it.
    pub fn observe(&mut self, x: f64) {
        // Track coverage before adding the new observation.
        if let Some(interval) = self.predict() {
            self.predictions_made += 1;
            if x >= interval.lower && x <= interval.upper {
                self.hits += 1;
            }
        }

        // Add to window.
        if self.observations.len() >= self.window {
            self.observations.pop_front();
        }
        self.observations.push_back(x);
        self.total_count += 1;
    }

    /// Compute a prediction interval for the next observation.
    ///
    /// Returns `None` if the calibration window has fewer than
    /// `MIN_CALIBRATION` (30) observations.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn predict(&self) -> Option<PredictionInterval> {
        let n = self.observations.len();
        if n < MIN_CALIBRATION {
            return None;
        }

        // Compute the median of the calibration window.
        let median = self.median();

        // Compute nonconformity scores: |obs - median|.
        let mut scores: Vec<f64> = self
            .observations
            .iter()
            .map(|&x| (x - median).abs())
            .collect();

        // The conformal quantile: ceil((n+1) * coverage) / n.
        // This ensures finite-sample coverage >= nominal coverage.
        let quantile_idx = ((n as f64 + 1.0) * self.coverage).ceil() as usize;
        let quantile_idx = quantile_idx.min(n) - 1; // 0-indexed, capped at n-1

        let (_, q, _) = scores.select_nth_unstable_by(quantile_idx, |a, b| {
            a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
        });
        let q = *q;

        Some(PredictionInterval {
            lower: median - q,
            upper: median + q,
            coverage: self.coverage,
            calibration_size: n,
        })
    }

    /// Compute the median of the calibration window.
    fn median(&self) -> f64 {
        let mut values: Vec<f64> = self.observations.iter().copied().collect();
        let n = values.len();
        if n == 0 {
            return 0.0;
        }

        let mid_idx = n / 2;
        let (_, median, _) = values.select_nth_unstable_by(mid_idx, |a, b| {
            a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
        });
        let median_val = *median;

        if n.is_multiple_of(2) {
            // Even number of elements: median is avg of sorted[mid-1] and sorted[mid].
            // select_nth_unstable puts element at mid_idx in place, and everything
            // smaller to the left. The max of the left partition is sorted[mid-1].
            let left_max = values[..mid_idx]
                .iter()
                .copied()
                .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                .unwrap_or(median_val);

            f64::midpoint(left_max, median_val)
        } else {
            median_val
        }
    }

    /// Number of observations in the calibration window.
    #[must_use]
    pub fn calibration_size(&self) -> usize {
        self.observations.len()
    }

    /// Total observations seen (including those evicted from window).
    #[must_use]
    pub const fn total_observations(&self) -> usize {
        self.total_count
    }

    /// Empirical coverage: fraction of predictions that contained the
    /// actual observation. Returns `None` if no predictions have been made.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn empirical_coverage(&self) -> Option<f64> {
        if self.predictions_made == 0 {
            return None;
        }
        Some(self.hits as f64 / self.predictions_made as f64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
