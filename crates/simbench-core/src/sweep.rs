//! Configuration generation and sequential batch driving.
//!
//! Three modes:
//! - `Repetition`: one configuration replicated N times into `run-1..run-N`;
//!   the first failure aborts the batch.
//! - `Parameter`: one run per workload size into `benchmark-<n>`, with a
//!   fixed pause between runs; failures are recorded and the sweep continues.
//! - `Grid`: one run per (dimension, workload) pair into `grid<S>x<S>-<n>`,
//!   with raster fixtures regenerated before each run.
//!
//! Every output directory is emptied right before its run is launched, so an
//! artifact can only come from the run that owns the directory.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};

use crate::chart::ChartLayout;
use crate::error::{HarnessError, Result};
use crate::fixtures::{FixtureSet, StagingGuard};
use crate::metrics::METRICS;
use crate::obs::{emit_run_failed, emit_sweep_finished, run_span};
use crate::orchestrator::{run_checked, SimulationLauncher};
use crate::run::{Flag, RunConfiguration, RunIdentity};

/// Flag carrying the workload size.
pub const AGENTS_FLAG: &str = "--agents";

/// One cell of a grid sweep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridCase {
    pub dimension: u32,
    pub agents: u64,
}

impl GridCase {
    pub fn new(dimension: u32, agents: u64) -> Self {
        Self { dimension, agents }
    }

    pub fn label(&self) -> String {
        format!("grid{0}x{0}-{1}", self.dimension, self.agents)
    }

    /// Recover the case from a `grid<S>x<S>-<n>` label.
    pub fn from_label(label: &str) -> Option<Self> {
        let (size, agents) = label.strip_prefix("grid")?.split_once('-')?;
        let (width, height) = size.split_once('x')?;
        let dimension: u32 = width.parse().ok()?;
        if height.parse::<u32>().ok()? != dimension {
            return None;
        }
        Some(Self::new(dimension, agents.parse().ok()?))
    }
}

/// How configurations are generated for a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepMode {
    Repetition { count: usize },
    Parameter { agents: Vec<u64>, pause: Duration },
    Grid { cases: Vec<GridCase> },
}

impl SweepMode {
    pub fn name(&self) -> &'static str {
        match self {
            SweepMode::Repetition { .. } => "repetition",
            SweepMode::Parameter { .. } => "parameter",
            SweepMode::Grid { .. } => "grid",
        }
    }

    /// How charts of this batch's results are laid out.
    pub fn chart_layout(&self) -> ChartLayout {
        match self {
            SweepMode::Grid { .. } => ChartLayout::Grid,
            _ => ChartLayout::Workload,
        }
    }
}

/// A configuration ready to launch, plus the fixture dimension it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRun {
    pub config: RunConfiguration,
    pub grid_dimension: Option<u32>,
}

/// A batch to run: generation mode, shared flags and the output root.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub mode: SweepMode,
    pub base_flags: Vec<Flag>,
    pub output_root: PathBuf,
}

impl SweepPlan {
    pub fn new(mode: SweepMode, base_flags: Vec<Flag>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            base_flags,
            output_root: output_root.into(),
        }
    }

    /// Generate every configuration of the batch, in launch order.
    ///
    /// Fails if the batch is empty or two configurations would share an output directory.
    pub fn configurations(&self) -> Result<Vec<PlannedRun>> {
        let planned: Vec<PlannedRun> = match &self.mode {
            SweepMode::Repetition { count } => (1..=*count)
                .map(|i| PlannedRun {
                    config: RunConfiguration::new(
                        RunIdentity::Sequence(i),
                        self.output_root.join(format!("run-{i}")),
                        self.base_flags.clone(),
                    ),
                    grid_dimension: None,
                })
                .collect(),
            SweepMode::Parameter { agents, .. } => agents
                .iter()
                .map(|&n| {
                    let label = format!("benchmark-{n}");
                    PlannedRun {
                        config: RunConfiguration::new(
                            RunIdentity::Label(label.clone()),
                            self.output_root.join(label),
                            self.flags_with_agents(n),
                        ),
                        grid_dimension: None,
                    }
                })
                .collect(),
            SweepMode::Grid { cases } => {
                if let Some(bad) = cases.iter().find(|c| c.dimension == 0) {
                    return Err(HarnessError::InvalidPlan(format!(
                        "grid dimension must be positive (case with {} agents)",
                        bad.agents
                    )));
                }
                cases
                    .iter()
                    .map(|case| PlannedRun {
                        config: RunConfiguration::new(
                            RunIdentity::Label(case.label()),
                            self.output_root.join(case.label()),
                            self.flags_with_agents(case.agents),
                        ),
                        grid_dimension: Some(case.dimension),
                    })
                    .collect()
            }
        };

        if planned.is_empty() {
            return Err(HarnessError::InvalidPlan(format!(
                "{} batch has no configurations",
                self.mode.name()
            )));
        }

        let mut seen = HashSet::new();
        for run in &planned {
            if !seen.insert(run.config.output_dir().to_path_buf()) {
                return Err(HarnessError::InvalidPlan(format!(
                    "output directory {} is used by more than one configuration",
                    run.config.output_dir().display()
                )));
            }
        }

        Ok(planned)
    }

    fn flags_with_agents(&self, agents: u64) -> Vec<Flag> {
        let mut flags = Vec::with_capacity(self.base_flags.len() + 1);
        flags.push(Flag::valued(AGENTS_FLAG, agents));
        flags.extend(self.base_flags.iter().cloned());
        flags
    }
}

/// Outcome of launching one configuration.
#[derive(Debug)]
pub struct LaunchedRun {
    pub config: RunConfiguration,
    /// `Ok` when the process exited with status 0.
    pub status: Result<()>,
}

impl LaunchedRun {
    pub fn succeeded(&self) -> bool {
        self.status.is_ok()
    }
}

/// Drives a batch through a launcher, strictly one process at a time.
pub struct SweepDriver {
    launcher: Arc<dyn SimulationLauncher>,
    fixtures: FixtureSet,
}

impl SweepDriver {
    pub fn new(launcher: Arc<dyn SimulationLauncher>, fixtures: FixtureSet) -> Self {
        Self { launcher, fixtures }
    }

    pub fn fixtures(&self) -> &FixtureSet {
        &self.fixtures
    }

    /// Run every configuration of `plan`.
    ///
    /// In repetition mode the first failure is returned as the error and no further
    /// repetitions run. In sweep modes failures are recorded per configuration; only
    /// harness-side problems (invalid plan, fixture I/O) end the sweep early. A grid
    /// sweep whose fixture directory overlaps the output root is an invalid plan.
    pub async fn drive(&self, plan: &SweepPlan) -> Result<Vec<LaunchedRun>> {
        let planned = plan.configurations()?;
        let total = planned.len();
        info!(mode = plan.mode.name(), total, "starting batch");

        let runs = match &plan.mode {
            SweepMode::Repetition { .. } => self.drive_strict(planned).await?,
            SweepMode::Parameter { pause, .. } => self.drive_tolerant(planned, *pause).await?,
            SweepMode::Grid { .. } => {
                check_fixture_isolation(self.fixtures.dir(), &plan.output_root)?;
                let _guard = StagingGuard::new(&self.fixtures);
                self.drive_tolerant(planned, Duration::ZERO).await?
            }
        };

        let succeeded = runs.iter().filter(|r| r.succeeded()).count();
        emit_sweep_finished(plan.mode.name(), runs.len(), succeeded);
        Ok(runs)
    }

    /// Empty the output directory, then launch.
    async fn launch_fresh(&self, config: &RunConfiguration) -> Result<()> {
        reset_output_dir(config)?;
        run_checked(self.launcher.as_ref(), config).await
    }

    async fn drive_strict(&self, planned: Vec<PlannedRun>) -> Result<Vec<LaunchedRun>> {
        let mut runs = Vec::with_capacity(planned.len());
        for run in planned {
            let label = run.config.label();
            if let Err(e) = self.launch_fresh(&run.config).instrument(run_span(&label)).await {
                METRICS.inc_runs_failed();
                emit_run_failed(&label, &e);
                return Err(e);
            }
            runs.push(LaunchedRun {
                config: run.config,
                status: Ok(()),
            });
        }
        Ok(runs)
    }

    async fn drive_tolerant(
        &self,
        planned: Vec<PlannedRun>,
        pause: Duration,
    ) -> Result<Vec<LaunchedRun>> {
        let last = planned.len().saturating_sub(1);
        let mut runs = Vec::with_capacity(planned.len());
        for (idx, run) in planned.into_iter().enumerate() {
            let label = run.config.label();
            if let Some(dimension) = run.grid_dimension {
                self.fixtures.stage(&label, dimension)?;
            }

            let status = self
                .launch_fresh(&run.config)
                .instrument(run_span(&label))
                .await;
            if let Err(e) = &status {
                METRICS.inc_runs_failed();
                emit_run_failed(&label, e);
            }
            runs.push(LaunchedRun {
                config: run.config,
                status,
            });

            if idx < last && !pause.is_zero() {
                info!(pause_ms = pause.as_millis() as u64, "waiting before next run");
                tokio::time::sleep(pause).await;
            }
        }
        Ok(runs)
    }
}

/// Empty the run's output directory, leaving it in place for the executable.
fn reset_output_dir(config: &RunConfiguration) -> Result<()> {
    let dir = config.output_dir();
    let reset = match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => fs::create_dir_all(dir),
    };
    reset.map_err(|source| HarnessError::OutputDir {
        label: config.label(),
        output_dir: dir.to_path_buf(),
        source,
    })
}

/// The fixture directory is wiped before every grid run, so it must not
/// share any part of the tree that holds run outputs.
fn check_fixture_isolation(fixture_dir: &Path, output_root: &Path) -> Result<()> {
    let fixtures = lexical_absolute(fixture_dir);
    let outputs = lexical_absolute(output_root);
    if fixtures.starts_with(&outputs) || outputs.starts_with(&fixtures) {
        return Err(HarnessError::InvalidPlan(format!(
            "fixture directory {} overlaps output root {}",
            fixture_dir.display(),
            output_root.display()
        )));
    }
    Ok(())
}

/// Absolute form of `path` with `.` and `..` resolved without touching the filesystem.
fn lexical_absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
