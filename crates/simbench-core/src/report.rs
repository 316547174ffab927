//! Report artifacts for a finished batch.
//!
//! - `benchmark_summary.csv`: one row per aggregated configuration, sorted by key
//! - `batch_report.json`: every configuration with its arguments and outcome
//! - a render request handed to a [`ChartRenderer`]

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::aggregate::{AggregatedRow, ComparisonTable, PerRunStats, ResolvedKey};
use crate::chart::{ChartLayout, ChartRenderer, ChartSeries, RenderRequest};
use crate::error::{FailureKind, HarnessError, Result};

/// Columns of the summary CSV, in order.
pub const SUMMARY_COLUMNS: [&str; 10] = [
    "label",
    "resolved_key",
    "key_source",
    "liveAgents_avg",
    "avg_tickTime",
    "median_tickTime",
    "avg_frameTime",
    "median_frameTime",
    "total_frameTime",
    "avg_updates_per_sec",
];

/// What happened to one configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded {
        key: ResolvedKey,
        stats: PerRunStats,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
}

impl RunOutcome {
    pub fn succeeded(key: ResolvedKey, stats: PerRunStats) -> Self {
        RunOutcome::Succeeded { key, stats }
    }

    pub fn failed(error: &HarnessError) -> Self {
        RunOutcome::Failed {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            RunOutcome::Failed { kind, .. } => Some(*kind),
            RunOutcome::Succeeded { .. } => None,
        }
    }
}

/// One configuration's entry in the batch report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchEntry {
    pub label: String,
    pub output_dir: PathBuf,
    /// Arguments passed to the executable; empty for analyse-only batches.
    pub args: Vec<String>,
    pub outcome: RunOutcome,
}

/// Every configuration of a batch with its outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub mode: String,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<BatchEntry>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn new(mode: impl Into<String>, entries: Vec<BatchEntry>) -> Self {
        let total = entries.len();
        let succeeded = entries.iter().filter(|e| e.outcome.is_success()).count();
        Self {
            batch_id: Uuid::new_v4(),
            mode: mode.into(),
            generated_at: Utc::now(),
            entries,
            total,
            succeeded,
            failed: total - succeeded,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| !e.outcome.is_success())
    }
}

/// Writes report artifacts into one directory.
#[derive(Debug, Clone)]
pub struct ReportSink {
    dir: PathBuf,
    summary_file: String,
}

impl ReportSink {
    pub fn new(dir: impl Into<PathBuf>, summary_file: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            summary_file: summary_file.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the comparison table as CSV and return its path.
    pub fn persist(&self, table: &ComparisonTable) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&self.summary_file);
        fs::write(&path, summary_csv(table))?;
        info!(path = %path.display(), rows = table.len(), "wrote summary table");
        Ok(path)
    }

    /// Write the batch report as pretty JSON and return its path.
    pub fn write_batch_report(&self, report: &BatchReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join("batch_report.json");
        fs::write(&path, serde_json::to_string_pretty(report)?)?;
        info!(path = %path.display(), total = report.total, failed = report.failed, "wrote batch report");
        Ok(path)
    }

    /// Build the render request for `series` laid out by `layout` and hand it to `renderer`.
    pub fn export(
        &self,
        table: &ComparisonTable,
        series: ChartSeries,
        layout: ChartLayout,
        renderer: &dyn ChartRenderer,
    ) -> Result<PathBuf> {
        let request = RenderRequest::from_table(table, series, layout);
        renderer.render(&request)
    }
}

fn fmt_value(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => v.to_string(),
        _ => "NaN".to_string(),
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn summary_line(row: &AggregatedRow) -> String {
    let s = &row.stats;
    [
        csv_field(&row.label),
        fmt_value(Some(row.key.value())),
        row.key.source().to_string(),
        fmt_value(Some(s.mean_live_agents)),
        fmt_value(Some(s.mean_tick_time)),
        fmt_value(Some(s.median_tick_time)),
        fmt_value(s.mean_frame_time),
        fmt_value(s.median_frame_time),
        fmt_value(s.total_frame_time),
        fmt_value(s.throughput.value()),
    ]
    .join(",")
}

/// The comparison table rendered as CSV text, header included.
pub fn summary_csv(table: &ComparisonTable) -> String {
    let mut out = SUMMARY_COLUMNS.join(",");
    out.push('\n');
    for row in table.rows() {
        out.push_str(&summary_line(row));
        out.push('\n');
    }
    out
}

/// The comparison table as a fixed-width text table for the terminal.
pub fn render_table(table: &ComparisonTable) -> String {
    let width = table
        .rows()
        .iter()
        .map(|r| r.label.len())
        .max()
        .unwrap_or(0)
        .max("benchmark".len());

    let mut out = format!(
        "{:<width$} {:>12} {:>14} {:>14} {:>14} {:>14} {:>16}\n",
        "benchmark",
        "liveAgents",
        "avg_tick",
        "median_tick",
        "avg_frame",
        "median_frame",
        "updates/sec",
    );
    for row in table.rows() {
        let s = &row.stats;
        out.push_str(&format!(
            "{:<width$} {:>12.1} {:>14.6} {:>14.6} {:>14} {:>14} {:>16}\n",
            row.label,
            row.key.value(),
            s.mean_tick_time,
            s.median_tick_time,
            s.mean_frame_time.map_or("-".to_string(), |v| format!("{v:.6}")),
            s.median_frame_time.map_or("-".to_string(), |v| format!("{v:.6}")),
            s.throughput.value().map_or("undefined".to_string(), |v| format!("{v:.1}")),
        ));
    }
    out
}
