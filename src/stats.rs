//! Trial samples and summary statistics.
//!
//! Error outcomes live inside the sample stream as reserved negative
//! sentinels rather than as a separate channel, so aggregation has to keep
//! them visible instead of dropping them.

use serde::Serialize;

/// A database-side trial failure.
pub const DB_ERROR_MS: i64 = -1;
/// A transport failure reaching or talking to the probe region.
pub const TRANSPORT_ERROR_MS: i64 = -2;

/// One timed connection trial.
///
/// Either field may hold a sentinel instead of a duration; a failed trial
/// carries the same sentinel in both.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrialSample {
    pub edge_to_host_ms: i64,
    pub total_ms: i64,
}

impl TrialSample {
    pub fn ok(edge_to_host_ms: i64, total_ms: i64) -> Self {
        Self { edge_to_host_ms, total_ms }
    }

    pub fn db_error() -> Self {
        Self { edge_to_host_ms: DB_ERROR_MS, total_ms: DB_ERROR_MS }
    }

    pub fn transport_error() -> Self {
        Self { edge_to_host_ms: TRANSPORT_ERROR_MS, total_ms: TRANSPORT_ERROR_MS }
    }

    pub fn is_error(&self) -> bool {
        self.edge_to_host_ms < 0 || self.total_ms < 0
    }
}

/// Which latency leg to aggregate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayLatency {
    EdgeToHost,
    Total,
}

/// Project one leg out of a sample sequence.
pub fn series(samples: &[TrialSample], view: DisplayLatency) -> Vec<i64> {
    samples
        .iter()
        .map(|s| match view {
            DisplayLatency::EdgeToHost => s.edge_to_host_ms,
            DisplayLatency::Total => s.total_ms,
        })
        .collect()
}

/// Summary of one region's series against the configured trial total.
#[derive(Debug, Clone, PartialEq)]
pub enum Summary {
    /// Fewer samples than the run will produce; no statistics yet.
    Waiting { completed: usize },
    /// Full series containing at least one error sentinel.
    Errored,
    /// Full, error-free series.
    Stats { mean: f64, median: i64 },
}

/// Summarize a full or partial series.
///
/// Statistics are only reported once the series is complete, and never when
/// a sentinel is present; sentinels must not leak into a mean.
pub fn summarize(values: &[i64], total: usize) -> Summary {
    if values.len() < total {
        return Summary::Waiting { completed: values.len() };
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    if sorted.first().is_some_and(|v| *v < 0) {
        return Summary::Errored;
    }

    let mean = sorted.iter().sum::<i64>() as f64 / sorted.len() as f64;
    let median = sorted[median_index(sorted.len())];
    Summary::Stats { mean, median }
}

/// One slot of the sorted percentile view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatencySlot {
    /// An error sentinel, kept in place rather than dropped.
    Error(i64),
    Ms(i64),
}

/// Full series sorted ascending, sentinels grouped at the low end and marked
/// as explicit error slots.
pub fn sorted_slots(values: &[i64]) -> Vec<LatencySlot> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    sorted
        .into_iter()
        .map(|v| if v < 0 { LatencySlot::Error(v) } else { LatencySlot::Ms(v) })
        .collect()
}

/// The five highlighted percentiles.
pub const PERCENTILE_MARKS: [u32; 5] = [5, 25, 50, 75, 95];

/// Nearest-rank index of percentile `p` in a sorted series of `n` samples.
///
/// round(p/100 * (n-1)); for 21 samples this lands the marks on indices
/// 1, 5, 10, 15 and 19, and the median on the 11th smallest.
pub fn percentile_index(p: u32, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    ((p as usize * (n - 1)) + 50) / 100
}

/// Index of the median mark.
pub fn median_index(n: usize) -> usize {
    percentile_index(50, n)
}

/// Mark indices for all five highlighted percentiles.
pub fn mark_indices(n: usize) -> [usize; 5] {
    PERCENTILE_MARKS.map(|p| percentile_index(p, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_series_reports_waiting() {
        let values: Vec<i64> = (0..5).collect();
        assert_eq!(summarize(&values, 21), Summary::Waiting { completed: 5 });
        assert_eq!(summarize(&[], 21), Summary::Waiting { completed: 0 });
    }

    #[test]
    fn test_full_series_with_sentinel_reports_errored() {
        let mut values: Vec<i64> = (1..=21).collect();
        values[7] = DB_ERROR_MS;
        assert_eq!(summarize(&values, 21), Summary::Errored);

        values[7] = TRANSPORT_ERROR_MS;
        assert_eq!(summarize(&values, 21), Summary::Errored);
    }

    #[test]
    fn test_full_clean_series_reports_mean_and_median() {
        let values: Vec<i64> = (1..=21).rev().collect();
        match summarize(&values, 21) {
            Summary::Stats { mean, median } => {
                assert!((mean - 11.0).abs() < 1e-9);
                assert_eq!(median, 11); // 11th smallest of 1..=21
            }
            other => panic!("unexpected summary {other:?}"),
        }
    }

    #[test]
    fn test_mark_indices_for_21_samples() {
        assert_eq!(mark_indices(21), [1, 5, 10, 15, 19]);
        assert_eq!(median_index(21), 10);
    }

    #[test]
    fn test_mark_indices_generalize() {
        // Degenerate and small sizes stay in bounds and ordered.
        for n in [1usize, 2, 5, 11, 21, 50, 101] {
            let marks = mark_indices(n);
            for pair in marks.windows(2) {
                assert!(pair[0] <= pair[1]);
            }
            assert!(marks[4] < n);
        }
        assert_eq!(median_index(101), 50);
    }

    #[test]
    fn test_sorted_slots_keep_sentinels_at_front() {
        let values = vec![30, TRANSPORT_ERROR_MS, 10, DB_ERROR_MS, 20];
        let slots = sorted_slots(&values);
        assert_eq!(
            slots,
            vec![
                LatencySlot::Error(TRANSPORT_ERROR_MS),
                LatencySlot::Error(DB_ERROR_MS),
                LatencySlot::Ms(10),
                LatencySlot::Ms(20),
                LatencySlot::Ms(30),
            ]
        );
    }

    #[test]
    fn test_series_projection() {
        let samples = vec![TrialSample::ok(10, 40), TrialSample::db_error()];
        assert_eq!(series(&samples, DisplayLatency::EdgeToHost), vec![10, DB_ERROR_MS]);
        assert_eq!(series(&samples, DisplayLatency::Total), vec![40, DB_ERROR_MS]);
    }
}
