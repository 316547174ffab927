//! Launching the external simulation executable.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{HarnessError, Result};
use crate::metrics::METRICS;
use crate::obs::{emit_run_finished, emit_run_launched};
use crate::run::RunConfiguration;

/// Backend that executes one run configuration to completion.
#[async_trait]
pub trait SimulationLauncher: Send + Sync {
    /// Run `config` and return the process exit code. Only a failure to start the
    /// process is an `Err`; a non-zero exit code is returned as-is.
    async fn launch(&self, config: &RunConfiguration) -> Result<i32>;
}

/// Launches the real executable, one process at a time.
///
/// Standard output and error are inherited so progress is visible live.
#[derive(Debug, Clone)]
pub struct ProcessOrchestrator {
    program: PathBuf,
}

impl ProcessOrchestrator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl SimulationLauncher for ProcessOrchestrator {
    async fn launch(&self, config: &RunConfiguration) -> Result<i32> {
        let label = config.label();
        emit_run_launched(&label, &self.program, &config.display_args());
        METRICS.inc_runs_launched();

        let start = Instant::now();
        let status = Command::new(&self.program)
            .args(config.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| HarnessError::Launch {
                label: label.clone(),
                output_dir: config.output_dir().to_path_buf(),
                program: self.program.clone(),
                source,
            })?;

        // Killed by a signal: there is no exit code to propagate.
        let exit_code = status.code().unwrap_or(-1);
        emit_run_finished(&label, start.elapsed().as_millis() as u64, exit_code);
        Ok(exit_code)
    }
}

/// Launch `config` and turn a non-zero exit code into [`HarnessError::ProcessFailure`].
pub async fn run_checked(launcher: &dyn SimulationLauncher, config: &RunConfiguration) -> Result<()> {
    match launcher.launch(config).await? {
        0 => Ok(()),
        code => Err(HarnessError::ProcessFailure {
            label: config.label(),
            output_dir: config.output_dir().to_path_buf(),
            code,
        }),
    }
}
