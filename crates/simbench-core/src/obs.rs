//! Structured observability for simbench.
//!
//! This module provides:
//! - [`init_tracing`] to configure the global subscriber once per process
//! - Run-scoped spans via [`run_span`] and the `RunSpan` RAII guard
//! - Emission functions for run, digest and sweep lifecycle events
//!
//! Logs go to stderr so that the simulation's inherited stdout and the summary
//! table stay readable. Filtering honours `SIMBENCH_LOG`, then `RUST_LOG`.

use std::path::Path;

use tracing::{info, warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON log lines.
/// * `level`: verbosity when neither `SIMBENCH_LOG` nor `RUST_LOG` is set.
///
/// Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_env("SIMBENCH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .ok();
    }
}

/// Span tagging every event of one configuration with its label.
///
/// Use with [`tracing::Instrument`] around async work; use [`RunSpan`] in synchronous code.
pub fn run_span(label: &str) -> tracing::Span {
    tracing::info_span!("simbench.run", run = %label)
}

/// RAII guard that tags every event of one configuration with its label.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(label: &str) -> Self {
        Self {
            _span: run_span(label).entered(),
        }
    }
}

pub fn emit_run_launched(label: &str, program: &Path, args: &[String]) {
    info!(
        event = "run.launched",
        run = %label,
        program = %program.display(),
        args = %args.join(" "),
    );
}

pub fn emit_run_finished(label: &str, duration_ms: u64, exit_code: i32) {
    info!(
        event = "run.finished",
        run = %label,
        duration_ms = duration_ms,
        exit_code = exit_code,
    );
}

/// Warn-level: a configuration failed and is recorded as such.
pub fn emit_run_failed(label: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.failed", run = %label, error = %error);
}

pub fn emit_digest_computed(label: &str, digest: &str) {
    info!(event = "digest.computed", run = %label, digest = %digest);
}

pub fn emit_determinism_verdict(runs: usize, passed: bool) {
    info!(event = "determinism.verdict", runs = runs, passed = passed);
}

pub fn emit_sweep_finished(mode: &str, total: usize, succeeded: usize) {
    info!(
        event = "sweep.finished",
        mode = %mode,
        total = total,
        succeeded = succeeded,
        failed = total - succeeded,
    );
}

/// Warn-level: throughput could not be derived for a run.
pub fn emit_undefined_throughput(label: &str, mean_tick_time: f64) {
    warn!(
        event = "aggregate.undefined_throughput",
        run = %label,
        mean_tick_time = mean_tick_time,
    );
}
