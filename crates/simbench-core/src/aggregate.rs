//! Per-run statistics and the cross-run comparison table.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::window::TelemetryWindow;

/// Derived agent updates per second.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Throughput {
    Defined(f64),
    /// Mean tick time was not positive.
    Undefined,
}

impl Throughput {
    /// `mean_live_agents / mean_tick_time`, undefined when the tick mean is not positive.
    pub fn derive(mean_live_agents: f64, mean_tick_time: f64) -> Self {
        if mean_tick_time > 0.0 {
            Throughput::Defined(mean_live_agents / mean_tick_time)
        } else {
            Throughput::Undefined
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Throughput::Defined(v) => Some(*v),
            Throughput::Undefined => None,
        }
    }
}

/// Statistics for one run's post-warmup window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerRunStats {
    /// Records in the window.
    pub samples: usize,
    pub mean_tick_time: f64,
    pub median_tick_time: f64,
    /// `None` when no record carried a frame time.
    pub mean_frame_time: Option<f64>,
    pub median_frame_time: Option<f64>,
    /// Sum of frame times over the window, i.e. wall-clock duration of the measured span.
    pub total_frame_time: Option<f64>,
    pub mean_live_agents: f64,
    pub throughput: Throughput,
}

/// Summarize a telemetry window.
pub fn summarize(window: &TelemetryWindow) -> PerRunStats {
    let records = window.records();
    let ticks: Vec<f64> = records.iter().map(|r| r.tick_time).collect();
    let frames: Vec<f64> = records.iter().filter_map(|r| r.frame_time).collect();
    let agents: Vec<f64> = records.iter().map(|r| r.live_agents as f64).collect();

    let mean_tick_time = mean(&ticks).unwrap_or(f64::NAN);
    let mean_live_agents = mean(&agents).unwrap_or(f64::NAN);

    PerRunStats {
        samples: records.len(),
        mean_tick_time,
        median_tick_time: median(&ticks).unwrap_or(f64::NAN),
        mean_frame_time: mean(&frames),
        median_frame_time: median(&frames),
        total_frame_time: (!frames.is_empty()).then(|| frames.iter().sum()),
        mean_live_agents,
        throughput: Throughput::derive(mean_live_agents, mean_tick_time),
    }
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median; even-length samples average the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// First run of decimal digits in `label`, e.g. `benchmark-250` → 250.
pub fn parse_nominal(label: &str) -> Option<u64> {
    static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"\d+").ok()).as_ref()?;
    re.find(label)?.as_str().parse().ok()
}

/// Sort and plot key of a row: the nominal workload from the label, or the
/// measured mean live agents when the label carries none.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum ResolvedKey {
    ParsedNominal(u64),
    FallbackMeasured(f64),
}

impl ResolvedKey {
    pub fn resolve(label: &str, stats: &PerRunStats) -> Self {
        match parse_nominal(label) {
            Some(nominal) => ResolvedKey::ParsedNominal(nominal),
            None => ResolvedKey::FallbackMeasured(stats.mean_live_agents),
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            ResolvedKey::ParsedNominal(n) => *n as f64,
            ResolvedKey::FallbackMeasured(m) => *m,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            ResolvedKey::ParsedNominal(_) => "nominal",
            ResolvedKey::FallbackMeasured(_) => "measured",
        }
    }
}

/// One configuration's row in the comparison table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedRow {
    pub label: String,
    pub key: ResolvedKey,
    pub stats: PerRunStats,
}

/// Build the table row for one run; the key is resolved here and nowhere else.
pub fn merge(label: &str, stats: PerRunStats) -> AggregatedRow {
    AggregatedRow {
        label: label.to_string(),
        key: ResolvedKey::resolve(label, &stats),
        stats,
    }
}

/// Rows sorted ascending by resolved key; equal keys keep insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComparisonTable {
    rows: Vec<AggregatedRow>,
}

impl ComparisonTable {
    pub fn from_rows(mut rows: Vec<AggregatedRow>) -> Self {
        rows.sort_by(|a, b| a.key.value().total_cmp(&b.key.value()));
        Self { rows }
    }

    pub fn rows(&self) -> &[AggregatedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Collects rows in configuration order, then produces the sorted table.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    rows: Vec<AggregatedRow>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: &str, stats: PerRunStats) -> &AggregatedRow {
        self.rows.push(merge(label, stats));
        &self.rows[self.rows.len() - 1]
    }

    pub fn finish(self) -> ComparisonTable {
        ComparisonTable::from_rows(self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TimeSeriesRecord;

    fn window(rows: &[(u64, f64, f64)]) -> TelemetryWindow {
        let records = rows
            .iter()
            .enumerate()
            .map(|(i, &(agents, frame, tick))| {
                TimeSeriesRecord::new(i as u64 + 1, agents, frame, tick)
            })
            .collect();
        TelemetryWindow::new(records).unwrap()
    }

    #[test]
    fn test_summarize_constant_series() {
        let stats = summarize(&window(&[(10, 1.0, 2.0), (10, 1.0, 2.0), (10, 1.0, 2.0)]));
        assert_eq!(stats.mean_tick_time, 2.0);
        assert_eq!(stats.median_tick_time, 2.0);
        assert_eq!(stats.mean_live_agents, 10.0);
        assert_eq!(stats.throughput, Throughput::Defined(5.0));
        assert_eq!(stats.total_frame_time, Some(3.0));
        assert_eq!(stats.samples, 3);
    }

    #[test]
    fn test_zero_tick_time_is_undefined_throughput() {
        let stats = summarize(&window(&[(10, 0.1, 0.0), (12, 0.1, 0.0)]));
        assert_eq!(stats.throughput, Throughput::Undefined);
        assert_eq!(stats.throughput.value(), None);
        assert_eq!(stats.mean_live_agents, 11.0);
    }

    #[test]
    fn test_frame_stats_absent_without_frame_times() {
        let mut records = window(&[(1, 0.0, 1.0), (1, 0.0, 3.0)]).into_records();
        for r in &mut records {
            r.frame_time = None;
        }
        let stats = summarize(&TelemetryWindow::new(records).unwrap());
        assert_eq!(stats.mean_frame_time, None);
        assert_eq!(stats.median_frame_time, None);
        assert_eq!(stats.total_frame_time, None);
        assert_eq!(stats.median_tick_time, 2.0);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_parse_nominal() {
        assert_eq!(parse_nominal("benchmark-250"), Some(250));
        assert_eq!(parse_nominal("benchmark100"), Some(100));
        assert_eq!(parse_nominal("benchmarkX"), None);
        assert_eq!(parse_nominal("grid400x400-2000"), Some(400));
    }

    #[test]
    fn test_key_falls_back_to_measured_mean() {
        let stats = summarize(&window(&[(40, 0.1, 0.1), (60, 0.1, 0.1)]));
        let row = merge("benchmarkX", stats.clone());
        assert_eq!(row.key, ResolvedKey::FallbackMeasured(50.0));
        assert_eq!(row.key.source(), "measured");

        let row = merge("benchmark-250", stats);
        assert_eq!(row.key, ResolvedKey::ParsedNominal(250));
        assert_eq!(row.key.value(), 250.0);
    }

    #[test]
    fn test_table_sorted_with_stable_ties() {
        let stats = summarize(&window(&[(500, 0.1, 0.1)]));
        let mut agg = MetricsAggregator::new();
        agg.push("benchmark-1000", stats.clone());
        agg.push("benchmark-500", stats.clone());
        agg.push("measured-a", stats.clone());
        agg.push("benchmark-100", stats);

        let table = agg.finish();
        let labels: Vec<&str> = table.rows().iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["benchmark-100", "benchmark-500", "measured-a", "benchmark-1000"]
        );
    }
}
