//! Time-series aggregation into an `AggregateReport`.
//!
//! Each matched column is reduced to the mean over all time steps. An entity's
//! figure is the mean of its columns' means, and the overall figure is the
//! mean of the entity columns' means, so it is a mean of per-entity means and
//! not a global mean over every cell. Metrics without any entity column fall
//! back to their aggregate columns. Overall latency is always read from the
//! schema's latency column.

use super::metrics::{entity_flow_stats, flow_totals, mean_skip_nan};
use super::types::*;
use crate::config::AnalyzerConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::schema::{MatchedColumn, Metric, SeriesSchema};

/// Reduce a run's time series, and its flow table when available
pub fn aggregate(
    series: &SeriesTable,
    flows: Option<&FlowTable>,
    schema: &SeriesSchema,
    config: &AnalyzerConfig,
    diagnostics: &dyn Diagnostics,
) -> AggregateReport {
    let run = series.run.as_str();
    let entity_count = config.classifier.entity_count as usize;
    let discovery = schema.discover(&series.columns);

    for (column, metrics) in &discovery.collisions {
        let names: Vec<&str> = metrics.iter().map(|m| m.label()).collect();
        diagnostics.emit(Diagnostic::warn(
            run,
            format!("Column '{}' matches several metrics: {}", column, names.join(", ")),
        ));
    }

    let mut matched_columns = Vec::new();
    let mut degraded = Vec::new();
    let mut overall = MetricMeans::default();
    let mut per_entity_means = vec![MetricMeans::default(); entity_count];

    for metric in Metric::ALL {
        let columns = discovery.columns(metric);
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        if names.is_empty() {
            diagnostics.emit(Diagnostic::info(
                run,
                format!("{}: no matching columns", metric.label()),
            ));
        } else {
            diagnostics.emit(Diagnostic::info(
                run,
                format!("{}: aggregating columns [{}]", metric.label(), names.join(", ")),
            ));
        }

        let column_means: Vec<(&MatchedColumn, Option<f64>)> = columns
            .iter()
            .map(|c| (c, mean_skip_nan(&series.values_at(c.position))))
            .collect();

        for (column, _) in &column_means {
            if let Some(entity) = column.entity {
                if entity >= entity_count {
                    diagnostics.emit(Diagnostic::warn(
                        run,
                        format!(
                            "Column '{}' refers to entity {} outside the configured {} entities",
                            column.name, entity, entity_count
                        ),
                    ));
                }
            }
        }

        for (index, means) in per_entity_means.iter_mut().enumerate() {
            let values: Vec<f64> = column_means
                .iter()
                .filter(|(c, _)| c.entity == Some(index))
                .filter_map(|(_, mean)| *mean)
                .collect();
            means.set(metric, mean_skip_nan(&values));
        }

        let value = if metric == Metric::Latency {
            let latency = latency_overall(series, schema, run, diagnostics, &mut degraded);
            if latency.is_none() {
                for means in per_entity_means.iter_mut() {
                    means.set(Metric::Latency, None);
                }
            }
            latency
        } else {
            let overall_value = overall_mean(&column_means);
            if overall_value.is_none() {
                let reason = if names.is_empty() {
                    "no column matched this metric".to_string()
                } else {
                    "matched columns contain no numeric values".to_string()
                };
                degraded.push(Degradation { metric, reason });
            }
            overall_value
        };
        overall.set(metric, value);

        matched_columns.push(MatchedMetricColumns {
            metric,
            columns: names,
        });
    }

    let flow_stats = flows.map(|table| entity_flow_stats(table, entity_count, &config.loss));
    let per_entity = per_entity_means
        .into_iter()
        .enumerate()
        .map(|(index, series)| EntityAggregate {
            index,
            name: config.entity_name(index),
            series,
            flows: flow_stats.as_ref().and_then(|stats| stats.get(index).cloned()),
        })
        .collect();

    for d in &degraded {
        diagnostics.emit(Diagnostic::warn(
            run,
            format!("{} aggregate degraded: {}", d.metric.label(), d.reason),
        ));
    }

    let totals = flows.map(|table| flow_totals(table, &config.loss, &config.totals));
    if totals.as_ref().is_some_and(|t| t.counters_saturated) {
        diagnostics.emit(Diagnostic::warn(
            run,
            "packet counter totals overflowed and were capped",
        ));
    }

    AggregateReport {
        run: run.to_string(),
        series_schema: schema.version.to_string(),
        per_entity,
        overall,
        totals,
        matched_columns,
        degraded,
        series_rows: series.row_count(),
        skipped_flow_records: flows.map(|t| t.skipped_records).unwrap_or(0),
        unmatched_flows: flows.map(|t| t.unmatched_count()).unwrap_or(0),
    }
}

/// Mean of entity column means, or of aggregate column means if no entity column exists
fn overall_mean(column_means: &[(&MatchedColumn, Option<f64>)]) -> Option<f64> {
    let has_entity_columns = column_means.iter().any(|(c, _)| c.entity.is_some());
    let values: Vec<f64> = column_means
        .iter()
        .filter(|(c, _)| c.entity.is_some() == has_entity_columns)
        .filter_map(|(_, mean)| *mean)
        .collect();
    mean_skip_nan(&values)
}

fn latency_overall(
    series: &SeriesTable,
    schema: &SeriesSchema,
    run: &str,
    diagnostics: &dyn Diagnostics,
    degraded: &mut Vec<Degradation>,
) -> Option<f64> {
    let Some(values) = series.column(&schema.latency_column) else {
        degraded.push(Degradation {
            metric: Metric::Latency,
            reason: format!("mandatory column '{}' is missing", schema.latency_column),
        });
        return None;
    };

    let mean = mean_skip_nan(&values);
    match mean {
        Some(value) => diagnostics.emit(Diagnostic::debug(
            run,
            format!("Overall latency {:.3} ms from '{}'", value, schema.latency_column),
        )),
        None => degraded.push(Degradation {
            metric: Metric::Latency,
            reason: format!("column '{}' contains no numeric values", schema.latency_column),
        }),
    }
    mean
}
