//! Latency aggregation.
//!
//! Every backend's sample goes through the same estimator, so the figures in
//! a comparison row are directly comparable.

use std::time::Duration;

use serde::Serialize;

use crate::error::EmptySampleError;

/// Quantile reported as the tail latency.
pub const TAIL_QUANTILE: f64 = 0.95;

/// Floor for elapsed time in rate calculations: one clock tick of `Instant`.
///
/// Calls too fast for the clock to see would otherwise produce infinite
/// rates, which JSON cannot represent.
pub const MIN_ELAPSED_MS: f64 = 1e-6;

/// Ordered per-call latencies of one (backend, scenario) run, in milliseconds.
///
/// Append-only while the run is in progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LatencySample {
    values_ms: Vec<f64>,
}

impl LatencySample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values_ms: Vec::with_capacity(capacity),
        }
    }

    /// Append one measured call.
    pub fn record(&mut self, elapsed: Duration) {
        self.values_ms.push(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn len(&self) -> usize {
        self.values_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values_ms.is_empty()
    }

    pub fn as_millis(&self) -> &[f64] {
        &self.values_ms
    }

    pub fn total_ms(&self) -> f64 {
        self.values_ms.iter().sum()
    }
}

impl From<Vec<f64>> for LatencySample {
    fn from(values_ms: Vec<f64>) -> Self {
        Self { values_ms }
    }
}

/// Summary statistics of a latency sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub total_ms: f64,
    pub avg_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    /// Calls per second of summed call time: `n / (sum_ms / 1000)`.
    ///
    /// A zero total is taken as [`MIN_ELAPSED_MS`], so the rate stays finite.
    pub fn qps(&self) -> f64 {
        self.count as f64 / (self.total_ms.max(MIN_ELAPSED_MS) / 1000.0)
    }

    /// Records per second for write cycles: `1000 / avg_ms * batch_size`.
    pub fn throughput_per_sec(&self, batch_size: u32) -> f64 {
        1000.0 / self.avg_ms.max(MIN_ELAPSED_MS) * f64::from(batch_size)
    }
}

/// Summarize a sample. Fails on an empty sample instead of reporting zeros.
pub fn summarize(sample: &LatencySample) -> Result<LatencySummary, EmptySampleError> {
    if sample.is_empty() {
        return Err(EmptySampleError);
    }

    let mut sorted = sample.as_millis().to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let count = sorted.len();
    let total_ms: f64 = sorted.iter().sum();

    Ok(LatencySummary {
        count,
        total_ms,
        avg_ms: total_ms / count as f64,
        median_ms: median(&sorted),
        p95_ms: nearest_rank(&sorted, TAIL_QUANTILE).ok_or(EmptySampleError)?,
        min_ms: sorted[0],
        max_ms: sorted[count - 1],
    })
}

/// Nearest-rank percentile over a sorted slice; `None` when it is empty.
///
/// Selects the value at rank `ceil(q * (n - 1))`.
pub fn nearest_rank(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (q.clamp(0.0, 1.0) * last as f64).ceil() as usize;
    sorted.get(rank.min(last)).copied()
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Throughput of a load run: completions over the observed wall-clock window.
pub fn load_qps(completions: u64, window: Duration) -> f64 {
    completions as f64 / window.as_secs_f64().max(MIN_ELAPSED_MS / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(values: &[f64]) -> LatencySample {
        LatencySample::from(values.to_vec())
    }

    #[test]
    fn test_empty_sample_fails() {
        assert_eq!(summarize(&LatencySample::new()), Err(EmptySampleError));
    }

    #[test]
    fn test_constant_sample() {
        let summary = summarize(&sample(&[10.0; 1000])).unwrap();
        assert_eq!(summary.count, 1000);
        assert!((summary.avg_ms - 10.0).abs() < 1e-9);
        assert!((summary.p95_ms - 10.0).abs() < 1e-9);
        assert!((summary.qps() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_nearest_rank_p95() {
        // 1..=20: rank ceil(0.95 * 19) = 19 -> 20.0
        let values: Vec<f64> = (1..=20).map(f64::from).collect();
        let summary = summarize(&sample(&values)).unwrap();
        assert_eq!(summary.p95_ms, 20.0);
        assert_eq!(summary.median_ms, 10.5);
        assert_eq!(summary.min_ms, 1.0);
        assert_eq!(summary.max_ms, 20.0);

        // 1..=100: rank ceil(0.95 * 99) = 95 -> 96.0
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(summarize(&sample(&values)).unwrap().p95_ms, 96.0);
    }

    #[test]
    fn test_unsorted_input() {
        let summary = summarize(&sample(&[5.0, 1.0, 3.0, 2.0, 4.0])).unwrap();
        assert_eq!(summary.median_ms, 3.0);
        assert_eq!(summary.p95_ms, 5.0);
        assert_eq!(summary.avg_ms, 3.0);
    }

    #[test]
    fn test_single_value() {
        let summary = summarize(&sample(&[7.5])).unwrap();
        assert_eq!(summary.p95_ms, 7.5);
        assert_eq!(summary.median_ms, 7.5);
    }

    #[test]
    fn test_p95_not_below_median() {
        // A few deterministic, oddly shaped samples.
        let shapes: Vec<Vec<f64>> = vec![
            vec![1.0, 100.0],
            vec![100.0, 1.0, 1.0],
            vec![0.1, 0.1, 0.1, 50.0, 0.1, 0.1],
            (0..37).map(|i| ((i * 7919) % 101) as f64).collect(),
            (0..64).map(|i| if i % 9 == 0 { 250.0 } else { 2.0 }).collect(),
        ];
        for values in shapes {
            let summary = summarize(&sample(&values)).unwrap();
            assert!(
                summary.p95_ms >= summary.median_ms,
                "p95 {} < median {} for {:?}",
                summary.p95_ms,
                summary.median_ms,
                values
            );
        }
    }

    #[test]
    fn test_nearest_rank_empty() {
        assert_eq!(nearest_rank(&[], TAIL_QUANTILE), None);
        assert_eq!(nearest_rank(&[1.0, 2.0], 1.0), Some(2.0));
    }

    #[test]
    fn test_rates_stay_finite_for_zero_time() {
        let summary = summarize(&sample(&[0.0, 0.0, 0.0])).unwrap();
        assert!(summary.qps().is_finite());
        assert!(summary.qps() > 0.0);
        assert!(summary.throughput_per_sec(100).is_finite());
        assert!(load_qps(10, Duration::ZERO).is_finite());

        let json = serde_json::to_value(summary.qps()).unwrap();
        assert!(json.is_number());
    }

    #[test]
    fn test_throughput_per_sec() {
        let summary = summarize(&sample(&[2.0, 2.0, 2.0])).unwrap();
        // 1000 / 2ms * 100 records per cycle
        assert!((summary.throughput_per_sec(100) - 50_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_load_qps() {
        let qps = load_qps(5_000, Duration::from_millis(2_500));
        assert!((qps - 2_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_record_converts_to_millis() {
        let mut s = LatencySample::new();
        s.record(Duration::from_micros(1500));
        assert_eq!(s.len(), 1);
        assert!((s.as_millis()[0] - 1.5).abs() < 1e-9);
    }
}
