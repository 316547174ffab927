//! Per-run analysis pipeline: load → window → summarize → merge.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::aggregate::{parse_nominal, summarize, ComparisonTable, MetricsAggregator, PerRunStats};
use crate::chart::RenderRequest;
use crate::error::{HarnessError, Result};
use crate::obs::{emit_run_failed, emit_undefined_throughput, RunSpan};
use crate::report::{BatchEntry, RunOutcome};
use crate::sweep::LaunchedRun;
use crate::telemetry;
use crate::window::WindowFilter;

/// Analyses the primary artifact of finished runs.
#[derive(Debug, Clone)]
pub struct RunAnalyzer {
    window: WindowFilter,
    artifact_name: String,
}

impl RunAnalyzer {
    pub fn new(window: WindowFilter, artifact_name: impl Into<String>) -> Self {
        Self {
            window,
            artifact_name: artifact_name.into(),
        }
    }

    /// Statistics for the run whose artifacts live in `output_dir`.
    pub fn analyse(&self, label: &str, output_dir: &Path) -> Result<PerRunStats> {
        let path = output_dir.join(&self.artifact_name);
        let records = telemetry::load(&path).map_err(|source| HarnessError::Telemetry {
            label: label.to_string(),
            output_dir: output_dir.to_path_buf(),
            source,
        })?;
        info!(run = %label, rows = records.len(), "loaded telemetry");

        let window = self
            .window
            .apply(&records)
            .map_err(|source| HarnessError::EmptyWindow {
                label: label.to_string(),
                output_dir: output_dir.to_path_buf(),
                source,
            })?;

        let stats = summarize(&window);
        if stats.throughput.value().is_none() {
            emit_undefined_throughput(label, stats.mean_tick_time);
        }
        Ok(stats)
    }

    /// Analyse one run and record its outcome; successful runs are pushed into `aggregator`.
    fn record(
        &self,
        label: String,
        output_dir: PathBuf,
        args: Vec<String>,
        launch: Result<()>,
        aggregator: &mut MetricsAggregator,
    ) -> BatchEntry {
        let _span = RunSpan::enter(&label);
        let outcome = match launch {
            // The driver already reported the launch failure.
            Err(e) => RunOutcome::failed(&e),
            Ok(()) => match self.analyse(&label, &output_dir) {
                Ok(stats) => {
                    let row = aggregator.push(&label, stats.clone());
                    RunOutcome::succeeded(row.key, stats)
                }
                Err(e) => {
                    emit_run_failed(&label, &e);
                    RunOutcome::failed(&e)
                }
            },
        };
        BatchEntry {
            label,
            output_dir,
            args,
            outcome,
        }
    }

    /// Analyse every launched run of a batch.
    ///
    /// Runs whose process failed are never read; they appear in the entries with
    /// their failure, as do runs whose telemetry could not be aggregated.
    pub fn analyse_batch(&self, runs: Vec<LaunchedRun>) -> (ComparisonTable, Vec<BatchEntry>) {
        let mut aggregator = MetricsAggregator::new();
        let entries = runs
            .into_iter()
            .map(|run| {
                self.record(
                    run.config.label(),
                    run.config.output_dir().to_path_buf(),
                    run.config.display_args(),
                    run.status,
                    &mut aggregator,
                )
            })
            .collect();
        (aggregator.finish(), entries)
    }

    /// Analyse run directories that already exist on disk.
    pub fn analyse_existing(&self, dirs: Vec<DiscoveredRun>) -> (ComparisonTable, Vec<BatchEntry>) {
        let mut aggregator = MetricsAggregator::new();
        let entries = dirs
            .into_iter()
            .map(|d| self.record(d.label, d.path, Vec::new(), Ok(()), &mut aggregator))
            .collect();
        (aggregator.finish(), entries)
    }
}

/// Population curve of one run: live agents per iteration from `artifact_name`,
/// keeping every `stride`-th record. No warmup window is applied.
pub fn population_request(
    label: &str,
    output_dir: &Path,
    artifact_name: &str,
    stride: usize,
) -> Result<RenderRequest> {
    let records = telemetry::load(&output_dir.join(artifact_name)).map_err(|source| {
        HarnessError::Telemetry {
            label: label.to_string(),
            output_dir: output_dir.to_path_buf(),
            source,
        }
    })?;
    info!(run = %label, rows = records.len(), stride, "loaded population telemetry");
    RenderRequest::population(label, &records, stride)
}

/// A run directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredRun {
    pub label: String,
    pub path: PathBuf,
}

/// Subdirectories of `root` whose names start with `prefix`, ordered by the
/// nominal value in their name; names without one sort last, by name.
pub fn discover_runs(root: &Path, prefix: &str) -> Result<Vec<DiscoveredRun>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) {
            found.push(DiscoveredRun {
                label: name,
                path: entry.path(),
            });
        }
    }

    found.sort_by(|a, b| {
        let key = |r: &DiscoveredRun| (parse_nominal(&r.label).is_none(), parse_nominal(&r.label));
        key(a).cmp(&key(b)).then_with(|| a.label.cmp(&b.label))
    });
    Ok(found)
}
