//! Cross-run comparison of time-series metrics.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use super::metrics::mean_skip_nan;
use super::series::load_series;
use super::types::*;
use crate::config::{AnalyzerConfig, ComparisonMetric, MissingColumnPolicy};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::AnalyzerError;
use crate::schema::SeriesSchema;
use crate::utils::workspace::SERIES_FILE;

/// Loads the time-series table of a run
pub trait SeriesSource: Sync {
    fn load(&self, run: &str) -> Result<SeriesTable, AnalyzerError>;
}

/// Reads `<root>/<run>/simulation_metrics.csv`
#[derive(Debug, Clone)]
pub struct DirectorySeriesSource {
    root: PathBuf,
}

impl DirectorySeriesSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, run: &str) -> PathBuf {
        self.root.join(run).join(SERIES_FILE)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SeriesSource for DirectorySeriesSource {
    fn load(&self, run: &str) -> Result<SeriesTable, AnalyzerError> {
        load_series(&self.path_for(run), run)
    }
}

/// Comparison settings for the requested metric names.
///
/// Metrics listed in the configuration keep their missing-column policy;
/// any other name is compared with `Skip`.
pub fn resolve_metrics(names: &[String], config: &AnalyzerConfig) -> Vec<ComparisonMetric> {
    names
        .iter()
        .map(|name| {
            config
                .comparison
                .metrics
                .iter()
                .find(|m| &m.column == name)
                .cloned()
                .unwrap_or_else(|| ComparisonMetric {
                    column: name.clone(),
                    missing: MissingColumnPolicy::Skip,
                })
        })
        .collect()
}

/// Columns every run must carry; the time column always comes first
pub fn required_columns(schema: &SeriesSchema, config: &AnalyzerConfig) -> Vec<String> {
    let mut required = vec![schema.time_column.clone()];
    for column in &config.series.required_columns {
        if !required.contains(column) {
            required.push(column.clone());
        }
    }
    required
}

/// Build one comparison set per metric over the requested runs.
///
/// Runs are loaded in parallel. Runs that cannot be loaded or lack a required
/// column are skipped with a warning; the series of the remaining runs keep
/// the order in which they were requested.
pub fn compare_runs(
    source: &dyn SeriesSource,
    runs: &[String],
    metrics: &[ComparisonMetric],
    schema: &SeriesSchema,
    required: &[String],
    diagnostics: &dyn Diagnostics,
) -> ComparisonReport {
    let loaded: Vec<(String, Result<SeriesTable, AnalyzerError>)> = runs
        .par_iter()
        .map(|run| {
            let table = source
                .load(run)
                .and_then(|table| validate_required(table, required));
            (run.clone(), table)
        })
        .collect();

    let mut warnings = Vec::new();
    let mut warn = |run: &str, message: String| {
        diagnostics.emit(Diagnostic::warn(run, message.clone()));
        warnings.push(format!("[{}] {}", run, message));
    };

    let mut valid = Vec::new();
    let mut skipped_runs = Vec::new();
    for (run, result) in loaded {
        match result {
            Ok(table) => valid.push(table),
            Err(e) => {
                warn(&run, format!("Skipping run: {}", e));
                skipped_runs.push(SkippedRun {
                    run,
                    reason: e.to_string(),
                });
            }
        }
    }

    let mut sets = Vec::with_capacity(metrics.len());
    for metric in metrics {
        let mut series = Vec::new();
        for table in &valid {
            let times = table.column(&schema.time_column).unwrap_or_default();

            if let Some(values) = table.column(&metric.column) {
                series.push(ComparisonSeries {
                    run: table.run.clone(),
                    origin: SeriesOrigin::Observed,
                    points: times.into_iter().zip(values).collect(),
                });
                continue;
            }

            match metric.missing {
                MissingColumnPolicy::Skip => {
                    warn(
                        &table.run,
                        format!("Metric '{}' not found; run left out of this comparison", metric.column),
                    );
                }
                MissingColumnPolicy::Zero => {
                    warn(
                        &table.run,
                        format!("Metric '{}' not found; using a zero series", metric.column),
                    );
                    series.push(zero_series(table, times));
                }
                MissingColumnPolicy::MeanOfMatching { metric: group } => {
                    let discovery = schema.discover(&table.columns);
                    let sources = discovery.columns(group);
                    if sources.is_empty() {
                        warn(
                            &table.run,
                            format!(
                                "Metric '{}' not found and no {} columns to synthesize from; using a zero series",
                                metric.column,
                                group.label()
                            ),
                        );
                        series.push(zero_series(table, times));
                        continue;
                    }

                    let names: Vec<String> = sources.iter().map(|c| c.name.clone()).collect();
                    warn(
                        &table.run,
                        format!(
                            "Metric '{}' not found; synthesized as the per-step mean of [{}]",
                            metric.column,
                            names.join(", ")
                        ),
                    );
                    let points = table
                        .rows
                        .iter()
                        .zip(times)
                        .map(|(row, time)| {
                            let values: Vec<f64> = sources
                                .iter()
                                .map(|c| row.get(c.position).copied().unwrap_or(f64::NAN))
                                .collect();
                            (time, mean_skip_nan(&values).unwrap_or(f64::NAN))
                        })
                        .collect();
                    series.push(ComparisonSeries {
                        run: table.run.clone(),
                        origin: SeriesOrigin::Synthesized { from: names },
                        points,
                    });
                }
            }
        }

        sets.push(ComparisonSet {
            metric: metric.column.clone(),
            series,
        });
    }

    diagnostics.emit(Diagnostic::global(
        log::Level::Info,
        format!(
            "Compared {} of {} runs over {} metrics",
            valid.len(),
            runs.len(),
            metrics.len()
        ),
    ));

    ComparisonReport {
        runs_requested: runs.to_vec(),
        sets,
        skipped_runs,
        warnings,
    }
}

fn validate_required(table: SeriesTable, required: &[String]) -> Result<SeriesTable, AnalyzerError> {
    if let Some(missing) = required.iter().find(|c| !table.has_column(c)) {
        return Err(AnalyzerError::SchemaMismatch {
            run: table.run.clone(),
            column: missing.clone(),
        });
    }
    Ok(table)
}

fn zero_series(table: &SeriesTable, times: Vec<f64>) -> ComparisonSeries {
    ComparisonSeries {
        run: table.run.clone(),
        origin: SeriesOrigin::Defaulted,
        points: times.into_iter().map(|t| (t, 0.0)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeriesFormat;
    use crate::diagnostics::MemoryDiagnostics;
    use crate::schema::Metric;
    use std::collections::HashMap;

    struct MapSource(HashMap<String, SeriesTable>);

    impl SeriesSource for MapSource {
        fn load(&self, run: &str) -> Result<SeriesTable, AnalyzerError> {
            self.0.get(run).cloned().ok_or_else(|| AnalyzerError::SeriesNotFound {
                run: run.to_string(),
                path: PathBuf::from(run).join(SERIES_FILE),
            })
        }
    }

    fn table(run: &str, columns: &[&str], rows: Vec<Vec<f64>>) -> (String, SeriesTable) {
        (
            run.to_string(),
            SeriesTable {
                run: run.to_string(),
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        )
    }

    fn schema() -> SeriesSchema {
        SeriesSchema::build(SeriesFormat::LteMetricsV1, "UE").unwrap()
    }

    fn runs(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn metric(column: &str, missing: MissingColumnPolicy) -> ComparisonMetric {
        ComparisonMetric {
            column: column.to_string(),
            missing,
        }
    }

    #[test]
    fn test_missing_required_column_skips_run() {
        let source = MapSource(HashMap::from([
            table("c", &["Time(s)", "Avg_Throughput(Kbps)"], vec![vec![0.0, 3.0]]),
            table("a", &["Time(s)", "Avg_Throughput(Kbps)"], vec![vec![0.0, 1.0]]),
            table("b", &["Avg_Throughput(Kbps)"], vec![vec![2.0]]),
        ]));
        let diagnostics = MemoryDiagnostics::new();
        let schema = schema();
        let report = compare_runs(
            &source,
            &runs(&["c", "b", "a"]),
            &[metric("Avg_Throughput(Kbps)", MissingColumnPolicy::Skip)],
            &schema,
            &[schema.time_column.clone()],
            &diagnostics,
        );

        let set = report.set("Avg_Throughput(Kbps)").unwrap();
        let order: Vec<&str> = set.series.iter().map(|s| s.run.as_str()).collect();
        assert_eq!(order, vec!["c", "a"]);
        assert_eq!(report.skipped_runs.len(), 1);
        assert_eq!(report.skipped_runs[0].run, "b");
        assert!(report.skipped_runs[0].reason.contains("Time(s)"));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(diagnostics.warnings().len(), 1);
    }

    #[test]
    fn test_loss_synthesized_from_entity_columns() {
        let source = MapSource(HashMap::from([table(
            "r",
            &["Time(s)", "UE_0_PacketLoss(%)", "UE_1_PacketLoss(%)"],
            vec![vec![0.0, 2.0, 4.0], vec![1.0, 6.0, f64::NAN]],
        )]));
        let schema = schema();
        let report = compare_runs(
            &source,
            &runs(&["r"]),
            &[metric(
                "Avg_PacketLoss(%)",
                MissingColumnPolicy::MeanOfMatching {
                    metric: Metric::PacketLoss,
                },
            )],
            &schema,
            &[schema.time_column.clone()],
            &MemoryDiagnostics::new(),
        );

        let series = &report.sets[0].series[0];
        assert_eq!(series.points, vec![(0.0, 3.0), (1.0, 6.0)]);
        assert!(matches!(series.origin, SeriesOrigin::Synthesized { ref from } if from.len() == 2));
        assert!(report.warnings[0].contains("synthesized"));
    }

    #[test]
    fn test_zero_default_when_nothing_to_synthesize() {
        let source = MapSource(HashMap::from([table(
            "r",
            &["Time(s)", "Avg_Throughput(Kbps)"],
            vec![vec![0.0, 1.0], vec![0.5, 2.0]],
        )]));
        let schema = schema();
        let report = compare_runs(
            &source,
            &runs(&["r"]),
            &[
                metric(
                    "Avg_PacketLoss(%)",
                    MissingColumnPolicy::MeanOfMatching {
                        metric: Metric::PacketLoss,
                    },
                ),
                metric("Avg_Jitter(ms)", MissingColumnPolicy::Zero),
                metric("Avg_Latency(ms)", MissingColumnPolicy::Skip),
            ],
            &schema,
            &[schema.time_column.clone()],
            &MemoryDiagnostics::new(),
        );

        assert_eq!(report.sets[0].series[0].origin, SeriesOrigin::Defaulted);
        assert_eq!(report.sets[0].series[0].points, vec![(0.0, 0.0), (0.5, 0.0)]);
        assert_eq!(report.sets[1].series[0].origin, SeriesOrigin::Defaulted);
        assert!(report.sets[2].series.is_empty());
        assert_eq!(report.warnings.len(), 3);
    }

    #[test]
    fn test_unloadable_run_is_skipped() {
        let source = MapSource(HashMap::new());
        let schema = schema();
        let report = compare_runs(
            &source,
            &runs(&["missing"]),
            &[metric("Avg_Throughput(Kbps)", MissingColumnPolicy::Skip)],
            &schema,
            &[schema.time_column.clone()],
            &MemoryDiagnostics::new(),
        );
        assert_eq!(report.skipped_runs[0].run, "missing");
        assert!(report.sets[0].series.is_empty());
    }

    #[test]
    fn test_resolve_metrics_keeps_configured_policy() {
        let config = AnalyzerConfig::default();
        let resolved = resolve_metrics(&runs(&["Avg_PacketLoss(%)", "Custom"]), &config);
        assert!(matches!(resolved[0].missing, MissingColumnPolicy::MeanOfMatching { .. }));
        assert_eq!(resolved[1].missing, MissingColumnPolicy::Skip);

        let mut config = AnalyzerConfig::default();
        config.series.required_columns = vec!["Time(s)".to_string(), "Avg_Latency(ms)".to_string()];
        assert_eq!(
            required_columns(&schema(), &config),
            vec!["Time(s)".to_string(), "Avg_Latency(ms)".to_string()]
        );
    }
}
