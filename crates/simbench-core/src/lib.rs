//! simbench core library
//!
//! Drives an external agent simulation to answer two questions:
//! - Is it deterministic? Repeat one configuration and compare output digests.
//! - How does it scale? Sweep workload sizes, window the telemetry and compare throughput.

pub mod aggregate;
pub mod analysis;
pub mod chart;
pub mod config;
pub mod determinism;
pub mod digest;
pub mod error;
pub mod fixtures;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod report;
pub mod run;
pub mod sweep;
pub mod telemetry;
pub mod window;

pub use aggregate::{
    merge, parse_nominal, summarize, AggregatedRow, ComparisonTable, MetricsAggregator,
    PerRunStats, ResolvedKey, Throughput,
};
pub use analysis::{discover_runs, population_request, DiscoveredRun, RunAnalyzer};
pub use chart::{
    chart_text_available, register_chart_font, ChartLayout, ChartLine, ChartRenderer, ChartSeries,
    JsonRequestWriter, PlottersRenderer, RenderRequest,
};
pub use config::{HarnessConfig, InvocationProfile};
pub use determinism::{verify_determinism, DeterminismReport, DigestEntry};
pub use digest::{fingerprint, DeterminismVerdict, DigestValue};
pub use error::{EmptyWindow, FailureKind, HarnessError, Result, TelemetryError};
pub use fixtures::{FixtureChannel, FixtureSet, StagingGuard};
pub use obs::{init_tracing, RunSpan};
pub use orchestrator::{run_checked, ProcessOrchestrator, SimulationLauncher};
pub use report::{render_table, BatchEntry, BatchReport, ReportSink, RunOutcome};
pub use run::{Flag, RunConfiguration, RunIdentity};
pub use sweep::{GridCase, LaunchedRun, SweepDriver, SweepMode, SweepPlan};
pub use telemetry::TimeSeriesRecord;
pub use window::{TelemetryWindow, WindowFilter};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
