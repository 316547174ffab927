//! Chart export.
//!
//! A [`RenderRequest`] is plain data: a title, axis names and one or more named
//! lines. A [`ChartRenderer`] turns it into a file. Two renderers ship here:
//! [`PlottersRenderer`] draws a PNG line chart and [`JsonRequestWriter`] stores
//! the request itself.
//!
//! PNG text needs a font registered through [`register_chart_font`]. Without one
//! the chart is drawn with axes, lines and markers only.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{AggregatedRow, ComparisonTable};
use crate::error::{HarnessError, Result};
use crate::sweep::GridCase;
use crate::telemetry::TimeSeriesRecord;

/// Family name chart text is drawn with.
const CHART_FONT: &str = "sans-serif";

static FONT_REGISTERED: OnceLock<PathBuf> = OnceLock::new();

const LINE_COLORS: [RGBColor; 4] = [BLUE, RED, GREEN, MAGENTA];

/// Which per-run value goes on the y axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChartSeries {
    /// Agent updates per second.
    #[default]
    Throughput,
    /// Summed frame time of the measured window.
    Duration,
}

impl ChartSeries {
    fn value(&self, row: &AggregatedRow) -> Option<f64> {
        match self {
            ChartSeries::Throughput => row.stats.throughput.value(),
            ChartSeries::Duration => row.stats.total_frame_time,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ChartSeries::Throughput => "throughput",
            ChartSeries::Duration => "duration",
        }
    }

    fn y_label(&self) -> &'static str {
        match self {
            ChartSeries::Throughput => "avg_updates_per_sec",
            ChartSeries::Duration => "total_frameTime",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ChartSeries::Throughput => "Agent updates per second",
            ChartSeries::Duration => "Measured run duration",
        }
    }
}

impl std::str::FromStr for ChartSeries {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "throughput" => Ok(ChartSeries::Throughput),
            "duration" => Ok(ChartSeries::Duration),
            other => Err(format!("unknown chart series '{other}' (expected throughput or duration)")),
        }
    }
}

/// How table rows are spread over the x axis and split into lines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChartLayout {
    /// One line over workload size.
    #[default]
    Workload,
    /// Grid size on x; grid-only runs (zero agents) and full runs are separate lines.
    Grid,
}

impl ChartLayout {
    fn x_label(&self) -> &'static str {
        match self {
            ChartLayout::Workload => "agents",
            ChartLayout::Grid => "grid size",
        }
    }
}

/// One named polyline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartLine {
    pub name: String,
    pub points: Vec<(f64, f64)>,
}

/// Data for one chart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderRequest {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Non-empty lines only.
    pub lines: Vec<ChartLine>,
}

impl RenderRequest {
    /// Project `table` onto `(resolved key, series value)`; rows without a finite value are left out.
    pub fn from_table(table: &ComparisonTable, series: ChartSeries, layout: ChartLayout) -> Self {
        let point = |row: &AggregatedRow| {
            let y = series.value(row)?;
            let x = row.key.value();
            (x.is_finite() && y.is_finite()).then_some((x, y))
        };

        let lines = match layout {
            ChartLayout::Workload => vec![ChartLine {
                name: series.name().to_string(),
                points: table.rows().iter().filter_map(point).collect(),
            }],
            ChartLayout::Grid => {
                let (grid_only, full): (Vec<&AggregatedRow>, Vec<&AggregatedRow>) =
                    table.rows().iter().partition(|row| {
                        GridCase::from_label(&row.label)
                            .map_or(row.stats.mean_live_agents == 0.0, |case| case.agents == 0)
                    });
                vec![
                    ChartLine {
                        name: "grid only (0 agents)".to_string(),
                        points: grid_only.into_iter().filter_map(point).collect(),
                    },
                    ChartLine {
                        name: "full run".to_string(),
                        points: full.into_iter().filter_map(point).collect(),
                    },
                ]
            }
        };

        Self {
            title: series.title().to_string(),
            x_label: layout.x_label().to_string(),
            y_label: series.y_label().to_string(),
            lines: lines.into_iter().filter(|l| !l.points.is_empty()).collect(),
        }
    }

    /// Live agents over iterations of one run, keeping every `stride`-th record.
    pub fn population(label: &str, records: &[TimeSeriesRecord], stride: usize) -> Result<Self> {
        if stride == 0 {
            return Err(HarnessError::InvalidPlan(
                "population stride must be positive".to_string(),
            ));
        }
        let points: Vec<(f64, f64)> = records
            .iter()
            .step_by(stride)
            .map(|r| (r.iteration as f64, r.live_agents as f64))
            .collect();
        let lines = if points.is_empty() {
            Vec::new()
        } else {
            vec![ChartLine {
                name: format!("every {stride}th record"),
                points,
            }]
        };
        Ok(Self {
            title: format!("Population over iterations ({label})"),
            x_label: "iteration".to_string(),
            y_label: "liveAgents".to_string(),
            lines,
        })
    }

    fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.lines.iter().flat_map(|l| l.points.iter().copied())
    }

    /// Padded axis ranges covering every point; a unit range when there are none.
    fn ranges(&self) -> (std::ops::Range<f64>, std::ops::Range<f64>) {
        let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let mut y_max = f64::NEG_INFINITY;
        for (x, y) in self.points() {
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_max = y_max.max(y);
        }
        if !x_min.is_finite() {
            return (0.0..1.0, 0.0..1.0);
        }
        let x_pad = if x_max > x_min { 0.05 * (x_max - x_min) } else { 1.0 };
        let y_top = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };
        ((x_min - x_pad)..(x_max + x_pad), 0.0..y_top)
    }
}

/// Turns a render request into a file.
pub trait ChartRenderer {
    /// Render `request` and return the path written.
    fn render(&self, request: &RenderRequest) -> Result<PathBuf>;
}

/// Stores the request as pretty JSON.
#[derive(Debug, Clone)]
pub struct JsonRequestWriter {
    path: PathBuf,
}

impl JsonRequestWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ChartRenderer for JsonRequestWriter {
    fn render(&self, request: &RenderRequest) -> Result<PathBuf> {
        ensure_parent(&self.path)?;
        fs::write(&self.path, serde_json::to_string_pretty(request)?)?;
        Ok(self.path.clone())
    }
}

/// Load a TrueType or OpenType font for chart text.
///
/// Only the first successful call takes effect for the process.
pub fn register_chart_font(path: &Path) -> Result<()> {
    if FONT_REGISTERED.get().is_some() {
        return Ok(());
    }
    let bytes = fs::read(path)?;
    // The font registry keeps a 'static reference for the life of the process.
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    register_font(CHART_FONT, FontStyle::Normal, bytes)
        .map_err(|_| HarnessError::Render(format!("invalid font {}", path.display())))?;
    FONT_REGISTERED.get_or_init(|| path.to_path_buf());
    info!(font = %path.display(), "registered chart font");
    Ok(())
}

/// Whether PNG charts carry a title, axis names, tick labels and a legend.
pub fn chart_text_available() -> bool {
    FONT_REGISTERED.get().is_some()
}

/// Draws a PNG line chart with a marker per point.
#[derive(Debug, Clone)]
pub struct PlottersRenderer {
    path: PathBuf,
    size: (u32, u32),
}

impl PlottersRenderer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size: (1200, 700),
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }
}

fn render_err(e: impl std::fmt::Display) -> HarnessError {
    HarnessError::Render(e.to_string())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

impl ChartRenderer for PlottersRenderer {
    fn render(&self, request: &RenderRequest) -> Result<PathBuf> {
        ensure_parent(&self.path)?;
        let (x_range, y_range) = request.ranges();
        let text = chart_text_available();

        let root = BitMapBackend::new(&self.path, self.size).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut builder = ChartBuilder::on(&root);
        builder.margin(20);
        if text {
            builder
                .caption(&request.title, (CHART_FONT, 24))
                .x_label_area_size(45)
                .y_label_area_size(80);
        }
        let mut chart = builder
            .build_cartesian_2d(x_range.clone(), y_range.clone())
            .map_err(render_err)?;

        if text {
            chart
                .configure_mesh()
                .x_desc(request.x_label.as_str())
                .y_desc(request.y_label.as_str())
                .label_style((CHART_FONT, 14))
                .draw()
                .map_err(render_err)?;
        } else {
            chart
                .draw_series([
                    PathElement::new(vec![(x_range.start, 0.0), (x_range.end, 0.0)], BLACK),
                    PathElement::new(vec![(x_range.start, 0.0), (x_range.start, y_range.end)], BLACK),
                ])
                .map_err(render_err)?;
        }

        for (idx, line) in request.lines.iter().enumerate() {
            let color = LINE_COLORS[idx % LINE_COLORS.len()];
            let drawn = chart
                .draw_series(LineSeries::new(line.points.iter().copied(), color))
                .map_err(render_err)?;
            if text {
                drawn
                    .label(line.name.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }
            chart
                .draw_series(
                    line.points
                        .iter()
                        .map(|&(x, y)| Circle::new((x, y), 4, color.filled())),
                )
                .map_err(render_err)?;
        }

        if text && !request.lines.is_empty() {
            chart
                .configure_series_labels()
                .label_font((CHART_FONT, 14))
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()
                .map_err(render_err)?;
        }

        root.present().map_err(render_err)?;
        info!(
            path = %self.path.display(),
            lines = request.lines.len(),
            points = request.points().count(),
            text,
            "rendered chart"
        );
        Ok(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{merge, summarize};
    use crate::window::TelemetryWindow;

    fn row(label: &str, agents: u64, tick: f64) -> AggregatedRow {
        let window = TelemetryWindow::new(vec![TimeSeriesRecord::new(1, agents, 0.25, tick)]).unwrap();
        merge(label, summarize(&window))
    }

    fn table() -> ComparisonTable {
        ComparisonTable::from_rows(vec![
            row("benchmark-400", 400, 0.5),
            row("benchmark-100", 100, 0.5),
            row("benchmark-0", 0, 0.0),
        ])
    }

    fn grid_row(label: &str, agents: u64, frame: f64) -> AggregatedRow {
        let window = TelemetryWindow::new(vec![TimeSeriesRecord::new(1, agents, frame, 0.1)]).unwrap();
        merge(label, summarize(&window))
    }

    #[test]
    fn test_request_skips_undefined_values() {
        let request = RenderRequest::from_table(&table(), ChartSeries::Throughput, ChartLayout::Workload);
        assert_eq!(request.lines.len(), 1);
        assert_eq!(request.lines[0].points, vec![(100.0, 200.0), (400.0, 800.0)]);
        assert_eq!(request.y_label, "avg_updates_per_sec");
        assert_eq!(request.x_label, "agents");
    }

    #[test]
    fn test_duration_series_uses_total_frame_time() {
        let request = RenderRequest::from_table(&table(), ChartSeries::Duration, ChartLayout::Workload);
        assert_eq!(request.lines[0].points.len(), 3);
        assert!(request.lines[0].points.iter().all(|&(_, y)| y == 0.25));
    }

    #[test]
    fn test_grid_layout_splits_grid_only_runs() {
        let table = ComparisonTable::from_rows(vec![
            grid_row("grid100x100-500", 500, 3.0),
            grid_row("grid200x200-1000", 1000, 3.0),
            grid_row("grid100x100-0", 0, 0.3),
            grid_row("grid200x200-0", 0, 0.3),
        ]);
        let request = RenderRequest::from_table(&table, ChartSeries::Duration, ChartLayout::Grid);

        assert_eq!(request.x_label, "grid size");
        assert_eq!(request.lines.len(), 2);
        assert_eq!(request.lines[0].name, "grid only (0 agents)");
        assert_eq!(request.lines[0].points, vec![(100.0, 0.3), (200.0, 0.3)]);
        assert_eq!(request.lines[1].name, "full run");
        assert_eq!(request.lines[1].points, vec![(100.0, 3.0), (200.0, 3.0)]);
    }

    #[test]
    fn test_grid_layout_drops_empty_line() {
        let table = ComparisonTable::from_rows(vec![grid_row("grid100x100-500", 500, 3.0)]);
        let request = RenderRequest::from_table(&table, ChartSeries::Duration, ChartLayout::Grid);
        assert_eq!(request.lines.len(), 1);
        assert_eq!(request.lines[0].name, "full run");
    }

    #[test]
    fn test_population_keeps_every_stride_record() {
        let records: Vec<TimeSeriesRecord> = (1..=2500)
            .map(|i| TimeSeriesRecord::new(i, 3000 - i, 0.01, 0.01))
            .collect();
        let request = RenderRequest::population("continents", &records, 1000).unwrap();

        assert_eq!(request.x_label, "iteration");
        assert_eq!(request.y_label, "liveAgents");
        assert!(request.title.contains("continents"));
        assert_eq!(
            request.lines[0].points,
            vec![(1.0, 2999.0), (1001.0, 1999.0), (2001.0, 999.0)]
        );
        assert!(RenderRequest::population("continents", &records, 0).is_err());
    }

    #[test]
    fn test_series_from_str() {
        assert_eq!("duration".parse::<ChartSeries>().unwrap(), ChartSeries::Duration);
        assert!("latency".parse::<ChartSeries>().is_err());
    }

    #[test]
    fn test_json_writer_stores_request() {
        let dir = tempfile::tempdir().unwrap();
        let request = RenderRequest::from_table(&table(), ChartSeries::Throughput, ChartLayout::Workload);
        let path = JsonRequestWriter::new(dir.path().join("charts/throughput.json"))
            .render(&request)
            .unwrap();
        let back: RenderRequest = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_plotters_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let request = RenderRequest::from_table(&table(), ChartSeries::Throughput, ChartLayout::Workload);
        let path = PlottersRenderer::new(dir.path().join("throughput.png"))
            .with_size(320, 200)
            .render(&request)
            .unwrap();
        let bytes = fs::read(path).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn test_register_rejects_non_font_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-font.ttf");
        fs::write(&path, b"plain text").unwrap();
        if chart_text_available() {
            return;
        }
        assert!(matches!(register_chart_font(&path), Err(HarnessError::Render(_))));
        assert!(register_chart_font(&dir.path().join("missing.ttf")).is_err());
        assert!(!chart_text_available());
    }
}
