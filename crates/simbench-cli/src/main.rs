//! simbench - benchmark and determinism harness for an agent simulation
//!
//! ## Commands
//!
//! - `determinism`: repeat one configuration and compare output digests
//! - `sweep`: one run per workload size, then aggregate throughput
//! - `grid`: one run per (grid size, workload) pair with generated raster fixtures
//! - `analyse`: aggregate run directories that already exist on disk
//! - `population`: chart live agents over iterations for one run

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn, Level};

use simbench_core::config::{DEFAULT_GRID_CASES, DEFAULT_SWEEP_AGENTS};
use simbench_core::metrics::METRICS;
use simbench_core::{
    discover_runs, population_request, register_chart_font, render_table, verify_determinism,
    BatchEntry, BatchReport, ChartLayout, ChartRenderer, ChartSeries, ComparisonTable, FixtureSet,
    GridCase, HarnessConfig, JsonRequestWriter, PlottersRenderer, ProcessOrchestrator,
    RenderRequest, ReportSink, RunAnalyzer, RunOutcome, SweepDriver, SweepMode, SweepPlan,
    WindowFilter,
};

#[derive(Parser)]
#[command(name = "simbench")]
#[command(author = "Stevedores Org")]
#[command(version = simbench_core::VERSION)]
#[command(about = "Determinism and scaling benchmarks for an agent simulation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// JSON configuration file; flags below override its values
    #[arg(long, global = true, env = "SIMBENCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every command.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Simulation executable
    #[arg(long, global = true, env = "SIMBENCH_PROGRAM")]
    program: Option<PathBuf>,

    /// Directory that receives one output directory per run
    #[arg(long, global = true, env = "SIMBENCH_OUTPUT_ROOT")]
    output_root: Option<PathBuf>,

    /// Leading iterations excluded from statistics
    #[arg(long, global = true, env = "SIMBENCH_WARMUP")]
    warmup: Option<u64>,

    /// Staging directory for grid fixtures
    #[arg(long, global = true, env = "SIMBENCH_FIXTURE_DIR")]
    fixture_dir: Option<PathBuf>,

    /// TrueType/OpenType font used for chart titles, axis names and legends
    #[arg(long, global = true, env = "SIMBENCH_CHART_FONT")]
    chart_font: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut HarnessConfig) {
        if let Some(program) = self.program {
            config.program = program;
        }
        if let Some(output_root) = self.output_root {
            config.output_root = output_root;
        }
        if let Some(warmup) = self.warmup {
            config.warmup = warmup;
        }
        if let Some(fixture_dir) = self.fixture_dir {
            config.fixture_dir = fixture_dir;
        }
        if let Some(font) = self.chart_font {
            config.chart_font = Some(font);
        }
    }
}

/// Report options for commands that aggregate telemetry.
#[derive(Args, Debug)]
struct ReportArgs {
    /// Chart y series: throughput or duration
    #[arg(long, default_value = "throughput")]
    series: ChartSeries,

    /// Write a PNG chart here, plus its render request next to it as JSON
    #[arg(long)]
    chart: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Repeat one configuration and check that every run's output is byte-identical
    Determinism {
        /// Number of repetitions
        #[arg(short = 'n', long, env = "SIMBENCH_REPETITIONS")]
        repetitions: Option<usize>,

        /// Preset descriptor passed to the simulation
        #[arg(long)]
        preset: Option<PathBuf>,

        /// Telemetry logging interval
        #[arg(long)]
        tlog: Option<u64>,
    },

    /// Run one benchmark per workload size and compare throughput
    Sweep {
        /// Workload sizes (default: 100,250,500,750,1000,2500,5000,7500,10000)
        #[arg(long, value_delimiter = ',')]
        agents: Vec<u64>,

        /// Pause between runs in milliseconds
        #[arg(long, env = "SIMBENCH_PAUSE_MS")]
        pause_ms: Option<u64>,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Run one benchmark per grid size and workload with generated fixtures
    Grid {
        /// Cases as SIZE:AGENTS pairs (default: 100:500,200:1000,400:2000,1000:5000,100:0,200:0,400:0,1000:0)
        #[arg(long, value_delimiter = ',', value_parser = parse_grid_case)]
        cases: Vec<GridCase>,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Aggregate existing run directories without launching anything
    Analyse {
        /// Directory to scan (default: the output root)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Only directories whose names start with this prefix
        #[arg(long, default_value = "benchmark")]
        prefix: String,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Chart live agents over iterations for one run directory
    Population {
        /// Run output directory
        run: PathBuf,

        /// Telemetry file inside the run directory (default: the tick data file)
        #[arg(long)]
        artifact: Option<String>,

        /// Keep every Nth record
        #[arg(long, default_value_t = 1000)]
        stride: usize,

        /// PNG to write; the render request is written next to it as JSON
        #[arg(long)]
        chart: PathBuf,
    },
}

/// Parse a `SIZE:AGENTS` grid case.
fn parse_grid_case(raw: &str) -> std::result::Result<GridCase, String> {
    let (size, agents) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected SIZE:AGENTS, got '{raw}'"))?;
    let dimension: u32 = size
        .trim()
        .parse()
        .map_err(|e| format!("invalid grid size '{size}': {e}"))?;
    if dimension == 0 {
        return Err("grid size must be positive".to_string());
    }
    let agents = agents
        .trim()
        .parse()
        .map_err(|e| format!("invalid agent count '{agents}': {e}"))?;
    Ok(GridCase::new(dimension, agents))
}

/// Clamp a child or harness exit code into the range a process can report.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    simbench_core::init_tracing(cli.json, level);

    let mut config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    cli.overrides.apply(&mut config);
    if let Some(font) = &config.chart_font {
        if let Err(e) = register_chart_font(font) {
            warn!(font = %font.display(), error = %e, "charts will be drawn without text");
        }
    }

    let result = match cli.command {
        Commands::Determinism {
            repetitions,
            preset,
            tlog,
        } => {
            if let Some(n) = repetitions {
                config.repetitions = n;
            }
            if let Some(preset) = preset {
                config.determinism.preset = preset;
            }
            if let Some(tlog) = tlog {
                config.determinism.tlog = tlog;
            }
            cmd_determinism(&config).await
        }
        Commands::Sweep {
            agents,
            pause_ms,
            report,
        } => {
            if let Some(ms) = pause_ms {
                config.pause_ms = ms;
            }
            let agents = if agents.is_empty() {
                DEFAULT_SWEEP_AGENTS.to_vec()
            } else {
                agents
            };
            let mode = SweepMode::Parameter {
                agents,
                pause: config.pause(),
            };
            cmd_sweep(&config, mode, &report).await
        }
        Commands::Grid { cases, report } => {
            let cases = if cases.is_empty() {
                DEFAULT_GRID_CASES
                    .iter()
                    .map(|&(dimension, agents)| GridCase::new(dimension, agents))
                    .collect()
            } else {
                cases
            };
            cmd_sweep(&config, SweepMode::Grid { cases }, &report).await
        }
        Commands::Analyse {
            root,
            prefix,
            report,
        } => {
            let root = root.unwrap_or_else(|| config.output_root.clone());
            cmd_analyse(&config, &root, &prefix, &report)
        }
        Commands::Population {
            run,
            artifact,
            stride,
            chart,
        } => {
            let artifact = artifact.unwrap_or_else(|| config.tick_data_file.clone());
            cmd_population(&run, &artifact, stride, &chart)
        }
    };

    METRICS.flush();
    Ok(ExitCode::from(result?))
}

fn driver(config: &HarnessConfig) -> SweepDriver {
    SweepDriver::new(
        Arc::new(ProcessOrchestrator::new(&config.program)),
        FixtureSet::new(&config.fixture_dir),
    )
}

fn analyzer(config: &HarnessConfig) -> RunAnalyzer {
    RunAnalyzer::new(
        WindowFilter::new(config.warmup),
        config.performance_data_file.clone(),
    )
}

/// Repeat the determinism configuration and print digests and verdict.
async fn cmd_determinism(config: &HarnessConfig) -> Result<u8> {
    let report = match verify_determinism(
        &driver(config),
        config.determinism.base_flags(),
        config.output_root.clone(),
        config.repetitions,
        &config.tick_data_file,
    )
    .await
    {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "determinism check aborted");
            eprintln!("Determinism check aborted: {e}");
            return Ok(exit_status(e.exit_code()));
        }
    };

    for entry in &report.entries {
        println!(
            "{:<8} {}  {}",
            entry.label,
            entry.digest,
            entry.output_dir.display()
        );
    }
    if report.verdict.passed() {
        println!("PASS: all {} runs produced identical output", report.entries.len());
        Ok(0)
    } else {
        println!("FAIL: outputs differ between runs");
        Ok(1)
    }
}

/// Drive a parameter or grid sweep, then aggregate and report.
async fn cmd_sweep(config: &HarnessConfig, mode: SweepMode, report: &ReportArgs) -> Result<u8> {
    let mode_name = mode.name();
    let layout = mode.chart_layout();
    let plan = SweepPlan::new(
        mode,
        config.benchmark.base_flags(),
        config.output_root.clone(),
    );
    let runs = driver(config)
        .drive(&plan)
        .await
        .with_context(|| format!("{mode_name} sweep aborted"))?;

    let (table, entries) = analyzer(config).analyse_batch(runs);
    publish(config, &config.output_root, mode_name, layout, table, entries, report)
}

/// Aggregate run directories found under `root`.
fn cmd_analyse(config: &HarnessConfig, root: &Path, prefix: &str, report: &ReportArgs) -> Result<u8> {
    let found = discover_runs(root, prefix)
        .with_context(|| format!("Failed to scan {}", root.display()))?;
    info!(root = %root.display(), prefix, found = found.len(), "discovered run directories");
    if found.is_empty() {
        println!("No directories starting with '{prefix}' under {}", root.display());
        return Ok(1);
    }

    let layout = if prefix.starts_with("grid") {
        ChartLayout::Grid
    } else {
        ChartLayout::Workload
    };
    let (table, entries) = analyzer(config).analyse_existing(found);
    publish(config, root, "analyse", layout, table, entries, report)
}

/// Downsample one run's telemetry and chart its population.
fn cmd_population(run: &Path, artifact: &str, stride: usize, chart: &Path) -> Result<u8> {
    let label = run
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| run.display().to_string());
    let request = population_request(&label, run, artifact, stride)
        .with_context(|| format!("Failed to read population of {}", run.display()))?;
    let (png, json) = write_chart(&request, chart)?;
    println!("Chart:        {} ({})", png.display(), json.display());
    Ok(0)
}

/// Render `request` to `chart` as PNG and store the request next to it as JSON.
fn write_chart(request: &RenderRequest, chart: &Path) -> Result<(PathBuf, PathBuf)> {
    let png = PlottersRenderer::new(chart)
        .render(request)
        .context("Failed to render chart")?;
    let json = JsonRequestWriter::new(chart.with_extension("json"))
        .render(request)
        .context("Failed to write chart request")?;
    Ok((png, json))
}

/// Print the table and write the summary, batch report and optional chart.
fn publish(
    config: &HarnessConfig,
    dir: &Path,
    mode: &str,
    layout: ChartLayout,
    table: ComparisonTable,
    entries: Vec<BatchEntry>,
    args: &ReportArgs,
) -> Result<u8> {
    let sink = ReportSink::new(dir, config.summary_file.clone());
    let batch = BatchReport::new(mode, entries);

    print!("{}", render_table(&table));
    for failed in batch.failures() {
        if let RunOutcome::Failed { kind, message } = &failed.outcome {
            println!("skipped {} ({kind:?}): {message}", failed.label);
        }
    }

    let summary = sink.persist(&table).context("Failed to write summary table")?;
    let batch_path = sink
        .write_batch_report(&batch)
        .context("Failed to write batch report")?;
    println!("Summary:      {}", summary.display());
    println!("Batch report: {}", batch_path.display());

    if let Some(chart) = &args.chart {
        let png = sink
            .export(&table, args.series, layout, &PlottersRenderer::new(chart))
            .context("Failed to render chart")?;
        let request = sink
            .export(
                &table,
                args.series,
                layout,
                &JsonRequestWriter::new(chart.with_extension("json")),
            )
            .context("Failed to write chart request")?;
        println!("Chart:        {} ({})", png.display(), request.display());
    }

    if table.is_empty() {
        error!(mode, "no configuration produced usable telemetry");
        return Ok(1);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grid_case() {
        assert_eq!(parse_grid_case("400:2000").unwrap(), GridCase::new(400, 2000));
        assert_eq!(parse_grid_case(" 100 : 0 ").unwrap(), GridCase::new(100, 0));
        assert!(parse_grid_case("400").is_err());
        assert!(parse_grid_case("0:10").is_err());
        assert!(parse_grid_case("x:10").is_err());
    }

    #[test]
    fn test_sweep_agents_list() {
        let cli = Cli::try_parse_from(["simbench", "sweep", "--agents", "100,250", "--pause-ms", "0"])
            .unwrap();
        match cli.command {
            Commands::Sweep { agents, pause_ms, report } => {
                assert_eq!(agents, vec![100, 250]);
                assert_eq!(pause_ms, Some(0));
                assert_eq!(report.series, ChartSeries::Throughput);
            }
            _ => panic!("expected sweep"),
        }
    }

    #[test]
    fn test_grid_cases_and_global_overrides() {
        let cli = Cli::try_parse_from([
            "simbench",
            "grid",
            "--cases",
            "100:500,200:0",
            "--series",
            "duration",
            "--warmup",
            "10",
        ])
        .unwrap();
        let mut config = HarnessConfig::default();
        cli.overrides.apply(&mut config);
        assert_eq!(config.warmup, 10);
        match cli.command {
            Commands::Grid { cases, report } => {
                assert_eq!(cases, vec![GridCase::new(100, 500), GridCase::new(200, 0)]);
                assert_eq!(report.series, ChartSeries::Duration);
            }
            _ => panic!("expected grid"),
        }
    }

    #[test]
    fn test_exit_status_clamps() {
        assert_eq!(exit_status(127), 127);
        assert_eq!(exit_status(-1), 1);
        assert_eq!(exit_status(300), 1);
    }

    #[test]
    fn test_population_writes_chart_and_request() {
        let root = tempfile::tempdir().unwrap();
        let run = root.path().join("continents");
        std::fs::create_dir_all(&run).unwrap();
        let mut csv = String::from("iteration,liveAgents,frameTime,tickTime\n");
        for i in 1..=3000 {
            csv.push_str(&format!("{i},{},0.1,0.1\n", 5000 - i));
        }
        std::fs::write(run.join("tickData.csv"), csv).unwrap();

        let chart = root.path().join("media/population.png");
        let code = cmd_population(&run, "tickData.csv", 1000, &chart).unwrap();
        assert_eq!(code, 0);
        assert!(chart.exists());

        let request: RenderRequest =
            serde_json::from_str(&std::fs::read_to_string(chart.with_extension("json")).unwrap())
                .unwrap();
        assert_eq!(request.x_label, "iteration");
        assert_eq!(request.lines[0].points.len(), 3);
        assert!(request.title.contains("continents"));
    }

    #[test]
    fn test_population_args() {
        let cli = Cli::try_parse_from(["simbench", "population", "output/continents", "--chart", "p.png"])
            .unwrap();
        match cli.command {
            Commands::Population { run, artifact, stride, chart } => {
                assert_eq!(run, PathBuf::from("output/continents"));
                assert_eq!(artifact, None);
                assert_eq!(stride, 1000);
                assert_eq!(chart, PathBuf::from("p.png"));
            }
            _ => panic!("expected population"),
        }
    }

    #[test]
    fn test_analyse_reports_existing_runs() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("benchmark-10");
        std::fs::create_dir_all(&dir).unwrap();
        let mut csv = String::from("iteration,liveAgents,frameTime,tickTime\n");
        for i in 1..=5 {
            csv.push_str(&format!("{i},10,0.1,0.5\n"));
        }
        std::fs::write(dir.join("performanceData.csv"), csv).unwrap();

        let config = HarnessConfig {
            warmup: 1,
            ..HarnessConfig::default()
        };
        let report = ReportArgs {
            series: ChartSeries::Throughput,
            chart: None,
        };
        let code = cmd_analyse(&config, root.path(), "benchmark", &report).unwrap();
        assert_eq!(code, 0);
        assert!(root.path().join("benchmark_summary.csv").exists());
        assert!(root.path().join("batch_report.json").exists());
    }
}
