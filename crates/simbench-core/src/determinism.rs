//! Determinism verification: repeat one configuration, fingerprint each
//! run's primary artifact, and require every fingerprint to match.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::digest::{fingerprint, DeterminismVerdict, DigestValue};
use crate::error::{HarnessError, Result, TelemetryError};
use crate::metrics::METRICS;
use crate::obs::{emit_determinism_verdict, emit_digest_computed};
use crate::run::Flag;
use crate::sweep::{SweepDriver, SweepMode, SweepPlan};

/// Fingerprint of one repetition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DigestEntry {
    pub label: String,
    pub output_dir: PathBuf,
    pub artifact: PathBuf,
    pub digest: DigestValue,
}

/// Result of a determinism check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeterminismReport {
    pub entries: Vec<DigestEntry>,
    pub verdict: DeterminismVerdict,
}

impl DeterminismReport {
    /// Fingerprint `artifact_name` inside each output directory and decide the verdict.
    pub fn from_runs(
        runs: impl IntoIterator<Item = (String, PathBuf)>,
        artifact_name: &str,
    ) -> Result<Self> {
        let mut entries = Vec::new();
        for (label, output_dir) in runs {
            let artifact = output_dir.join(artifact_name);
            let digest = fingerprint(&artifact).map_err(|source| HarnessError::Telemetry {
                label: label.clone(),
                output_dir: output_dir.clone(),
                source: if source.kind() == std::io::ErrorKind::NotFound {
                    TelemetryError::NotFound {
                        path: artifact.clone(),
                    }
                } else {
                    TelemetryError::Io {
                        path: artifact.clone(),
                        source,
                    }
                },
            })?;
            METRICS.inc_digests();
            emit_digest_computed(&label, &digest.to_hex());
            entries.push(DigestEntry {
                label,
                output_dir,
                artifact,
                digest,
            });
        }

        let digests: Vec<DigestValue> = entries.iter().map(|e| e.digest).collect();
        let verdict = DeterminismVerdict::from_digests(&digests);
        emit_determinism_verdict(entries.len(), verdict.passed());
        Ok(Self { entries, verdict })
    }
}

/// Run `repetitions` identical configurations, then compare their artifacts.
///
/// Any failed repetition aborts the check before a single artifact is read.
pub async fn verify_determinism(
    driver: &SweepDriver,
    base_flags: Vec<Flag>,
    output_root: PathBuf,
    repetitions: usize,
    artifact_name: &str,
) -> Result<DeterminismReport> {
    if repetitions < 2 {
        return Err(HarnessError::InvalidPlan(format!(
            "determinism needs at least 2 repetitions, got {repetitions}"
        )));
    }
    let plan = SweepPlan::new(SweepMode::Repetition { count: repetitions }, base_flags, output_root);
    let runs = driver.drive(&plan).await?;

    DeterminismReport::from_runs(
        runs.into_iter()
            .map(|r| (r.config.label(), r.config.output_dir().to_path_buf())),
        artifact_name,
    )
}
