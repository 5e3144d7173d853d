//! Plot generation for runs and run comparisons.
//!
//! The analysis code only talks to `PlotSink`; `SvgPlotter` renders with
//! plotters' SVG backend.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use color_eyre::eyre::{Context, Result};
use plotters::prelude::{
    ChartBuilder, Color, IntoDrawingArea, LineSeries, Palette, Palette99, PathElement, Rectangle,
    SVGBackend, BLACK, WHITE,
};

use super::types::*;
use crate::schema::{Metric, SeriesSchema};

/// Extension of every plot file
pub const PLOT_EXTENSION: &str = "svg";

/// One labelled line of a line chart
#[derive(Debug, Clone, PartialEq)]
pub struct PlotLine {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

/// Renders charts to files
pub trait PlotSink: Send + Sync {
    fn line_chart(
        &self,
        path: &Path,
        title: &str,
        x_label: &str,
        y_label: &str,
        lines: &[PlotLine],
    ) -> Result<()>;

    fn bar_chart(&self, path: &Path, title: &str, y_label: &str, bars: &[(String, f64)]) -> Result<()>;
}

/// plotters SVG renderer
#[derive(Debug, Clone, Copy)]
pub struct SvgPlotter {
    pub width: u32,
    pub height: u32,
}

impl Default for SvgPlotter {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 600,
        }
    }
}

impl PlotSink for SvgPlotter {
    fn line_chart(
        &self,
        path: &Path,
        title: &str,
        x_label: &str,
        y_label: &str,
        lines: &[PlotLine],
    ) -> Result<()> {
        let finite: Vec<Vec<(f64, f64)>> = lines
            .iter()
            .map(|l| {
                l.points
                    .iter()
                    .copied()
                    .filter(|(x, y)| x.is_finite() && y.is_finite())
                    .collect()
            })
            .collect();
        let (x_range, y_range) = bounds(finite.iter().flatten().copied());

        let root = SVGBackend::new(path, (self.width, self.height)).into_drawing_area();
        root.fill(&WHITE)
            .with_context(|| format!("Failed to draw {}", path.display()))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 22))
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, y_range)
            .with_context(|| format!("Failed to build chart for {}", path.display()))?;

        chart
            .configure_mesh()
            .x_desc(x_label)
            .y_desc(y_label)
            .draw()
            .with_context(|| format!("Failed to draw axes of {}", path.display()))?;

        for (i, (line, points)) in lines.iter().zip(finite).enumerate() {
            let color = Palette99::pick(i).to_rgba();
            chart
                .draw_series(LineSeries::new(points, color.stroke_width(2)))
                .with_context(|| format!("Failed to draw '{}' in {}", line.label, path.display()))?
                .label(line.label.clone())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .with_context(|| format!("Failed to draw legend of {}", path.display()))?;

        root.present()
            .with_context(|| format!("Failed to write plot {}", path.display()))?;
        Ok(())
    }

    fn bar_chart(&self, path: &Path, title: &str, y_label: &str, bars: &[(String, f64)]) -> Result<()> {
        let count = bars.len().max(1);
        let (_, y_range) = bounds(
            bars.iter()
                .filter(|(_, v)| v.is_finite())
                .map(|(_, v)| (0.0, *v))
                .chain(std::iter::once((0.0, 0.0))),
        );
        let labels: Vec<String> = bars.iter().map(|(name, _)| name.clone()).collect();

        let root = SVGBackend::new(path, (self.width, self.height)).into_drawing_area();
        root.fill(&WHITE)
            .with_context(|| format!("Failed to draw {}", path.display()))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 22))
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(-0.5f64..(count as f64 - 0.5), y_range)
            .with_context(|| format!("Failed to build chart for {}", path.display()))?;

        let label_of = |x: &f64| {
            let index = x.round();
            if (x - index).abs() < 1e-6 && index >= 0.0 && (index as usize) < labels.len() {
                labels[index as usize].clone()
            } else {
                String::new()
            }
        };

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(count)
            .x_label_formatter(&label_of)
            .y_desc(y_label)
            .draw()
            .with_context(|| format!("Failed to draw axes of {}", path.display()))?;

        let color = Palette99::pick(0).to_rgba();
        chart
            .draw_series(bars.iter().enumerate().filter(|(_, (_, v))| v.is_finite()).map(|(i, (_, v))| {
                let x = i as f64;
                Rectangle::new([(x - 0.35, 0.0), (x + 0.35, *v)], color.filled())
            }))
            .with_context(|| format!("Failed to draw bars of {}", path.display()))?;

        root.present()
            .with_context(|| format!("Failed to write plot {}", path.display()))?;
        Ok(())
    }
}

/// Chart call captured by `RecordingPlotter`
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedPlot {
    Line { file: String, lines: Vec<String> },
    Bar { file: String, bars: Vec<(String, f64)> },
}

/// Records chart requests without rendering anything
#[derive(Debug, Default)]
pub struct RecordingPlotter {
    calls: Mutex<Vec<RecordedPlot>>,
}

impl RecordingPlotter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordedPlot> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, plot: RecordedPlot) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(plot);
    }
}

impl PlotSink for RecordingPlotter {
    fn line_chart(&self, path: &Path, _: &str, _: &str, _: &str, lines: &[PlotLine]) -> Result<()> {
        self.record(RecordedPlot::Line {
            file: file_name(path),
            lines: lines.iter().map(|l| l.label.clone()).collect(),
        });
        Ok(())
    }

    fn bar_chart(&self, path: &Path, _: &str, _: &str, bars: &[(String, f64)]) -> Result<()> {
        self.record(RecordedPlot::Bar {
            file: file_name(path),
            bars: bars.to_vec(),
        });
        Ok(())
    }
}

/// Time-series and bar charts of one run; returns the files written
pub fn plot_run(
    series: &SeriesTable,
    report: &AggregateReport,
    schema: &SeriesSchema,
    plots_dir: &Path,
    sink: &dyn PlotSink,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let plot_path = |stem: &str| plots_dir.join(format!("{}.{}", stem, PLOT_EXTENSION));

    match series.column(&schema.time_column) {
        Some(times) => {
            let discovery = schema.discover(&series.columns);
            let per_entity = [
                (Metric::Throughput, "ue-throughput-time-series", "Per-UE Throughput Over Time"),
                (Metric::PacketLoss, "ue-packetloss-time-series", "Per-UE Packet Loss Over Time"),
                (Metric::Jitter, "ue-jitter-time-series", "Per-UE Jitter Over Time"),
            ];
            for (metric, stem, title) in per_entity {
                let columns = discovery.columns(metric);
                let entity_columns: Vec<_> = columns.iter().filter(|c| c.entity.is_some()).collect();
                let chosen: Vec<_> = if entity_columns.is_empty() {
                    columns.iter().collect()
                } else {
                    entity_columns
                };
                let lines: Vec<PlotLine> = chosen
                    .iter()
                    .map(|c| PlotLine {
                        label: line_label(&c.name),
                        points: times.iter().copied().zip(series.values_at(c.position)).collect(),
                    })
                    .filter(|l| has_finite_point(&l.points))
                    .collect();
                if lines.is_empty() {
                    log::debug!("[{}] No {} data to plot", series.run, metric.label());
                    continue;
                }
                let path = plot_path(stem);
                sink.line_chart(&path, title, "Time (s)", &axis_label(metric), &lines)?;
                written.push(path);
            }

            if let Some(latency) = series.column(&schema.latency_column) {
                let line = PlotLine {
                    label: line_label(&schema.latency_column),
                    points: times.iter().copied().zip(latency).collect(),
                };
                if has_finite_point(&line.points) {
                    let path = plot_path("aggregate-latency-time-series");
                    sink.line_chart(
                        &path,
                        "Aggregate Latency Over Time",
                        "Time (s)",
                        &axis_label(Metric::Latency),
                        &[line],
                    )?;
                    written.push(path);
                }
            }
        }
        None => log::warn!(
            "[{}] No '{}' column; time-series plots skipped",
            series.run,
            schema.time_column
        ),
    }

    let throughput_bars: Vec<(String, f64)> = report
        .per_entity
        .iter()
        .filter_map(|e| e.series.throughput.map(|v| (e.name.clone(), v)))
        .collect();
    if !throughput_bars.is_empty() {
        let path = plot_path("average-throughput-per-ue");
        sink.bar_chart(&path, "Average Throughput per UE", &axis_label(Metric::Throughput), &throughput_bars)?;
        written.push(path);
    }

    let single_bars = [
        (Metric::Latency, "average-latency", "Average Latency", "Avg Latency"),
        (Metric::PacketLoss, "average-packet-loss", "Average Packet Loss", "Avg Packet Loss"),
    ];
    for (metric, stem, title, bar) in single_bars {
        if let Some(value) = report.overall.get(metric) {
            let path = plot_path(stem);
            sink.bar_chart(&path, title, &axis_label(metric), &[(bar.to_string(), value)])?;
            written.push(path);
        }
    }

    log::info!("[{}] {} plots written to {}", series.run, written.len(), plots_dir.display());
    Ok(written)
}

/// One line chart per compared metric; returns the files written
pub fn plot_comparison(report: &ComparisonReport, output_dir: &Path, sink: &dyn PlotSink) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for set in &report.sets {
        if set.series.is_empty() {
            log::warn!("No run provides '{}'; comparison plot skipped", set.metric);
            continue;
        }
        let lines: Vec<PlotLine> = set
            .series
            .iter()
            .map(|s| PlotLine {
                label: s.run.clone(),
                points: s.points.clone(),
            })
            .collect();
        let path = output_dir.join(format!(
            "{}_comparison.{}",
            set.metric.replace('/', "_"),
            PLOT_EXTENSION
        ));
        sink.line_chart(
            &path,
            &format!("{} Comparison Across Runs", set.metric),
            "Time (s)",
            &set.metric,
            &lines,
        )?;
        log::info!("Saved plot: {}", path.display());
        written.push(path);
    }
    Ok(written)
}

fn axis_label(metric: Metric) -> String {
    format!("{} ({})", metric.label(), metric.series_unit())
}

/// "UE_0_Throughput(Kbps)" -> "UE 0 Throughput"
fn line_label(column: &str) -> String {
    let name = match column.find('(') {
        Some(i) => &column[..i],
        None => column,
    };
    name.replace('_', " ").trim().to_string()
}

fn has_finite_point(points: &[(f64, f64)]) -> bool {
    points.iter().any(|(x, y)| x.is_finite() && y.is_finite())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Axis ranges covering the points, widened when degenerate
fn bounds(points: impl Iterator<Item = (f64, f64)>) -> (std::ops::Range<f64>, std::ops::Range<f64>) {
    let mut x = (f64::INFINITY, f64::NEG_INFINITY);
    let mut y = (f64::INFINITY, f64::NEG_INFINITY);
    for (px, py) in points {
        x = (x.0.min(px), x.1.max(px));
        y = (y.0.min(py), y.1.max(py));
    }
    (widen(x), widen(y))
}

fn widen((lo, hi): (f64, f64)) -> std::ops::Range<f64> {
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    if hi - lo < f64::EPSILON {
        return (lo - 1.0)..(hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad)..(hi + pad)
}
