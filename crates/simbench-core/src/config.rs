//! Harness configuration.
//!
//! Every tunable that the benchmark scripts used to hard-code lives here and is passed
//! explicitly into the driver, the window filter and the report sink.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::run::Flag;

/// Default number of repetitions for determinism verification.
pub const DEFAULT_REPETITIONS: usize = 5;

/// Default number of leading iterations treated as warmup.
pub const DEFAULT_WARMUP: u64 = 1000;

/// Default pause between parameter-sweep runs, in milliseconds.
pub const DEFAULT_PAUSE_MS: u64 = 3000;

/// How the executable is invoked for one kind of batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvocationProfile {
    /// Telemetry logging interval (`--tlog`).
    pub tlog: u64,

    /// Workload preset descriptor (`--preset`).
    pub preset: PathBuf,

    /// Pass `--test-performance`.
    pub performance_mode: bool,
}

impl InvocationProfile {
    /// Flags shared by every run of a batch, in invocation order.
    pub fn base_flags(&self) -> Vec<Flag> {
        let mut flags = Vec::with_capacity(3);
        if self.performance_mode {
            flags.push(Flag::switch("--test-performance"));
        }
        flags.push(Flag::valued("--tlog", self.tlog));
        flags.push(Flag::valued("--preset", self.preset.display()));
        flags
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Path to the simulation executable.
    pub program: PathBuf,

    /// Directory under which every run's output directory is created.
    pub output_root: PathBuf,

    /// Invocation used for determinism repetitions.
    pub determinism: InvocationProfile,

    /// Invocation used for parameter and grid sweeps.
    pub benchmark: InvocationProfile,

    /// Repetitions per determinism check.
    pub repetitions: usize,

    /// Leading iterations excluded from statistics.
    pub warmup: u64,

    /// Pause after each parameter-sweep run (milliseconds).
    pub pause_ms: u64,

    /// Staging directory for grid-sweep raster fixtures.
    pub fixture_dir: PathBuf,

    /// Primary artifact fingerprinted by determinism runs.
    pub tick_data_file: String,

    /// Primary artifact aggregated by benchmark runs.
    pub performance_data_file: String,

    /// Summary table file name, written under `output_root`.
    pub summary_file: String,

    /// TrueType/OpenType font for chart text; charts carry no text without one.
    pub chart_font: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ecosystem.exe"),
            output_root: PathBuf::from("output"),
            determinism: InvocationProfile {
                tlog: 1000,
                preset: PathBuf::from("preset.json"),
                performance_mode: false,
            },
            benchmark: InvocationProfile {
                tlog: 1_000_000,
                preset: PathBuf::from("benchmarkPreset.json"),
                performance_mode: true,
            },
            repetitions: DEFAULT_REPETITIONS,
            warmup: DEFAULT_WARMUP,
            pause_ms: DEFAULT_PAUSE_MS,
            fixture_dir: PathBuf::from("grid"),
            tick_data_file: "tickData.csv".to_string(),
            performance_data_file: "performanceData.csv".to_string(),
            summary_file: "benchmark_summary.csv".to_string(),
            chart_font: None,
        }
    }
}

impl HarnessConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|source| HarnessError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

/// Workload sizes swept by default.
pub const DEFAULT_SWEEP_AGENTS: [u64; 9] = [100, 250, 500, 750, 1000, 2500, 5000, 7500, 10000];

/// (grid dimension, workload size) pairs swept by default.
pub const DEFAULT_GRID_CASES: [(u32, u64); 8] = [
    (100, 500),
    (200, 1000),
    (400, 2000),
    (1000, 5000),
    (100, 0),
    (200, 0),
    (400, 0),
    (1000, 0),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_benchmark_scripts() {
        let config = HarnessConfig::default();
        assert_eq!(config.repetitions, 5);
        assert_eq!(config.warmup, 1000);
        assert_eq!(config.pause(), Duration::from_secs(3));
        assert_eq!(config.program, PathBuf::from("ecosystem.exe"));
    }

    #[test]
    fn test_benchmark_profile_flags() {
        let flags = HarnessConfig::default().benchmark.base_flags();
        assert_eq!(flags[0], Flag::switch("--test-performance"));
        assert_eq!(flags[1], Flag::valued("--tlog", 1_000_000));
        assert_eq!(flags[2], Flag::valued("--preset", "benchmarkPreset.json"));
    }

    #[test]
    fn test_determinism_profile_has_no_performance_switch() {
        let flags = HarnessConfig::default().determinism.base_flags();
        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0], Flag::valued("--tlog", 1000));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simbench.json");
        std::fs::write(&path, r#"{ "warmup": 50, "repetitions": 3 }"#).unwrap();

        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.warmup, 50);
        assert_eq!(config.repetitions, 3);
        assert_eq!(config.tick_data_file, "tickData.csv");
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = HarnessConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
