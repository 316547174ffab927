//! Error taxonomy for simbench.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Exit code reported when the simulation executable could not be spawned at all.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 127;

/// Errors produced while reading a telemetry artifact.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry file {path} not found")]
    NotFound { path: PathBuf },

    #[error("{path} is missing columns: {}", missing.join(", "))]
    MissingColumns { path: PathBuf, missing: Vec<String> },

    #[error("{path}:{line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The post-warmup window of a run contained no records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "no records left after trimming warmup {warmup} (max iteration {max_iteration:?}, {total_records} record(s) loaded)"
)]
pub struct EmptyWindow {
    pub warmup: u64,
    pub max_iteration: Option<u64>,
    pub total_records: usize,
}

/// Top-level harness errors. Run-scoped variants carry the configuration label.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("run {label} ({}) exited with code {code}", output_dir.display())]
    ProcessFailure {
        label: String,
        output_dir: PathBuf,
        code: i32,
    },

    #[error("run {label} ({}): failed to launch {}: {source}", output_dir.display(), program.display())]
    Launch {
        label: String,
        output_dir: PathBuf,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run {label} ({}): {source}", output_dir.display())]
    Telemetry {
        label: String,
        output_dir: PathBuf,
        #[source]
        source: TelemetryError,
    },

    #[error("run {label} ({}): {source}", output_dir.display())]
    EmptyWindow {
        label: String,
        output_dir: PathBuf,
        #[source]
        source: EmptyWindow,
    },

    #[error("run {label} ({}): failed to reset output directory: {source}", output_dir.display())]
    OutputDir {
        label: String,
        output_dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid sweep plan: {0}")]
    InvalidPlan(String),

    #[error("run {label}: failed to stage fixture {}: {source}", path.display())]
    Fixture {
        label: String,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("chart rendering failed: {0}")]
    Render(String),

    #[error("invalid configuration file {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Classify this error for the batch report.
    pub fn kind(&self) -> FailureKind {
        match self {
            HarnessError::ProcessFailure { .. } => FailureKind::ProcessFailure,
            HarnessError::Launch { .. } => FailureKind::LaunchFailure,
            HarnessError::Telemetry { source, .. } => match source {
                TelemetryError::NotFound { .. } => FailureKind::MissingArtifact,
                TelemetryError::MissingColumns { .. } => FailureKind::SchemaViolation,
                TelemetryError::Malformed { .. } | TelemetryError::Io { .. } => {
                    FailureKind::MalformedTelemetry
                }
            },
            HarnessError::EmptyWindow { .. } => FailureKind::EmptyWindow,
            _ => FailureKind::Harness,
        }
    }

    /// Exit code to hand back to the operator when this error aborts a batch.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::ProcessFailure { code, .. } => *code,
            HarnessError::Launch { .. } => LAUNCH_FAILURE_EXIT_CODE,
            _ => 1,
        }
    }
}

/// Serialisable failure classification, one per fatal error kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ProcessFailure,
    LaunchFailure,
    MissingArtifact,
    SchemaViolation,
    MalformedTelemetry,
    EmptyWindow,
    Harness,
}

/// Result type for simbench operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
