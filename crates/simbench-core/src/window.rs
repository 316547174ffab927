//! Warmup and boundary trimming for telemetry series.

use crate::config::DEFAULT_WARMUP;
use crate::error::EmptyWindow;
use crate::telemetry::TimeSeriesRecord;

/// A non-empty, rebased window of telemetry records.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryWindow(Vec<TimeSeriesRecord>);

impl TelemetryWindow {
    /// Wrap `records`, returning `None` when there are none.
    pub fn new(records: Vec<TimeSeriesRecord>) -> Option<Self> {
        (!records.is_empty()).then_some(Self(records))
    }

    pub fn records(&self) -> &[TimeSeriesRecord] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn into_records(self) -> Vec<TimeSeriesRecord> {
        self.0
    }
}

/// Removes the warmup prefix and the final, possibly truncated, tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFilter {
    warmup: u64,
}

impl Default for WindowFilter {
    fn default() -> Self {
        Self::new(DEFAULT_WARMUP)
    }
}

impl WindowFilter {
    pub fn new(warmup: u64) -> Self {
        Self { warmup }
    }

    pub fn warmup(&self) -> u64 {
        self.warmup
    }

    /// Keep records with `warmup < iteration < max_iteration`, rebased so the
    /// first retained iteration after the warmup is 1.
    pub fn apply(&self, records: &[TimeSeriesRecord]) -> Result<TelemetryWindow, EmptyWindow> {
        let max_iteration = records.iter().map(|r| r.iteration).max();
        let retained = match max_iteration {
            Some(max) => records
                .iter()
                .filter(|r| r.iteration > self.warmup && r.iteration < max)
                .map(|r| TimeSeriesRecord {
                    iteration: r.iteration - self.warmup,
                    ..*r
                })
                .collect(),
            None => Vec::new(),
        };

        TelemetryWindow::new(retained).ok_or(EmptyWindow {
            warmup: self.warmup,
            max_iteration,
            total_records: records.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(iterations: impl IntoIterator<Item = u64>) -> Vec<TimeSeriesRecord> {
        iterations
            .into_iter()
            .map(|i| TimeSeriesRecord::new(i, 10, 0.016, 0.002))
            .collect()
    }

    #[test]
    fn test_trims_warmup_and_final_tick() {
        let window = WindowFilter::new(1000).apply(&series(1..=1005)).unwrap();
        let iterations: Vec<u64> = window.records().iter().map(|r| r.iteration).collect();
        assert_eq!(iterations, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_default_warmup_is_1000() {
        assert_eq!(WindowFilter::default().warmup(), 1000);
    }

    #[test]
    fn test_keeps_other_fields() {
        let mut records = series(1..=4);
        records[1].live_agents = 99;
        let window = WindowFilter::new(1).apply(&records).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window.records()[0].iteration, 1);
        assert_eq!(window.records()[0].live_agents, 99);
    }

    #[test]
    fn test_duplicate_max_iterations_are_all_dropped() {
        let window = WindowFilter::new(0).apply(&series([1, 2, 3, 3])).unwrap();
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_run_shorter_than_warmup_is_empty() {
        let err = WindowFilter::new(1000).apply(&series(1..=1001)).unwrap_err();
        assert_eq!(err.max_iteration, Some(1001));
        assert_eq!(err.total_records, 1001);
    }

    #[test]
    fn test_no_records_is_empty() {
        let err = WindowFilter::default().apply(&[]).unwrap_err();
        assert_eq!(err.max_iteration, None);
        assert_eq!(err.total_records, 0);
    }

    #[test]
    fn test_window_rejects_empty() {
        assert!(TelemetryWindow::new(Vec::new()).is_none());
    }
}
