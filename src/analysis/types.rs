//! Core data types for flow and time-series analysis.

use serde::Serialize;

use crate::config::{LossConvention, ThroughputConfig};
use crate::schema::Metric;

/// Placeholder written for descriptive fields a trace did not provide
pub const UNKNOWN: &str = "unknown";

/// One observed network flow, times in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRecord {
    pub flow_id: u64,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    /// True when `lost_packets` came from the trace rather than tx - rx
    pub lost_reported: bool,
    /// True when derived loss would be negative (rx > tx); `lost_packets` is then 0
    pub counters_inconsistent: bool,
    pub tx_bytes: f64,
    pub rx_bytes: f64,
    pub delay_sum_ms: f64,
    pub jitter_sum_ms: f64,
    /// Last reception minus first transmission; may be <= 0
    pub duration_ms: f64,
    /// Same span on the raw numeric values of the trace, unit suffixes ignored
    pub raw_duration: f64,
    pub source_port: Option<u16>,
    pub destination_port: Option<u16>,
    /// `UNKNOWN` when the classifier entry or the attribute is absent
    pub source_address: String,
    pub destination_address: String,
    pub protocol: String,
    /// Owning entity, `None` when unmatched
    pub entity_index: Option<usize>,
}

impl FlowRecord {
    /// A flow with every counter at zero and unknown descriptive fields
    pub fn empty(flow_id: u64) -> Self {
        Self {
            flow_id,
            tx_packets: 0,
            rx_packets: 0,
            lost_packets: 0,
            lost_reported: false,
            counters_inconsistent: false,
            tx_bytes: 0.0,
            rx_bytes: 0.0,
            delay_sum_ms: 0.0,
            jitter_sum_ms: 0.0,
            duration_ms: 0.0,
            raw_duration: 0.0,
            source_port: None,
            destination_port: None,
            source_address: UNKNOWN.to_string(),
            destination_address: UNKNOWN.to_string(),
            protocol: UNKNOWN.to_string(),
            entity_index: None,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.entity_index.is_some()
    }
}

/// Metrics computed from a `FlowRecord`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedMetrics {
    /// In the configured output unit; 0 when the duration is not positive
    pub throughput: f64,
    /// 0 when no packet was received
    pub avg_delay_ms: f64,
    /// 0 when no packet was received
    pub avg_jitter_ms: f64,
    /// NaN when no packet was transmitted
    pub loss_rate_pct: f64,
}

/// Classified flows of one run
#[derive(Debug, Clone)]
pub struct FlowTable {
    pub run: String,
    pub schema_version: String,
    pub records: Vec<FlowRecord>,
    /// Flow elements dropped because they could not be parsed
    pub skipped_records: usize,
    pub throughput: ThroughputConfig,
}

impl FlowTable {
    /// Records with derived metrics, in trace order
    pub fn rows(&self) -> impl Iterator<Item = (&FlowRecord, DerivedMetrics)> + '_ {
        self.records
            .iter()
            .map(move |r| (r, super::metrics::derive_metrics(r, &self.throughput)))
    }

    /// Rows owned by an entity
    pub fn matched_rows(&self) -> impl Iterator<Item = (&FlowRecord, DerivedMetrics)> + '_ {
        self.rows().filter(|(r, _)| r.is_matched())
    }

    pub fn matched_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_matched()).count()
    }

    pub fn unmatched_count(&self) -> usize {
        self.records.len() - self.matched_count()
    }

    pub fn inconsistent_count(&self) -> usize {
        self.records.iter().filter(|r| r.counters_inconsistent).count()
    }
}

/// Trace-wide sums
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowTotals {
    pub flows_counted: usize,
    pub includes_unmatched: bool,
    pub total_tx_packets: u64,
    pub total_rx_packets: u64,
    pub total_lost_packets: u64,
    /// True when a packet total overflowed and was capped at `u64::MAX`
    pub counters_saturated: bool,
    /// Trace-level loss rate under `loss_convention`; NaN when undefined
    pub loss_rate_pct: f64,
    pub loss_convention: LossConvention,
    /// Total delay over total received packets
    pub avg_delay_ms: f64,
    /// Total jitter over total received packets
    pub avg_jitter_ms: f64,
}

/// Flow-table statistics for one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityFlowStats {
    pub flow_count: usize,
    pub mean_throughput: Option<f64>,
    pub mean_delay_ms: Option<f64>,
    /// `None` when no flow had a defined loss rate
    pub mean_loss_rate_pct: Option<f64>,
    pub mean_jitter_ms: Option<f64>,
}

/// Mean of each metric; `None` marks a metric with no data
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MetricMeans {
    pub throughput: Option<f64>,
    pub latency_ms: Option<f64>,
    pub packet_loss_pct: Option<f64>,
    pub jitter_ms: Option<f64>,
}

impl MetricMeans {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Throughput => self.throughput,
            Metric::Latency => self.latency_ms,
            Metric::PacketLoss => self.packet_loss_pct,
            Metric::Jitter => self.jitter_ms,
        }
    }

    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        match metric {
            Metric::Throughput => self.throughput = value,
            Metric::Latency => self.latency_ms = value,
            Metric::PacketLoss => self.packet_loss_pct = value,
            Metric::Jitter => self.jitter_ms = value,
        }
    }
}

/// Aggregates for one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityAggregate {
    pub index: usize,
    pub name: String,
    /// From the time-series table
    pub series: MetricMeans,
    /// From the flow table, when one was supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flows: Option<EntityFlowStats>,
}

/// A metric the aggregator could not compute in full
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Degradation {
    pub metric: Metric,
    pub reason: String,
}

/// Columns that fed a metric's aggregation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedMetricColumns {
    pub metric: Metric,
    pub columns: Vec<String>,
}

/// Run-level reduction of the flow table and the time series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub run: String,
    pub series_schema: String,
    /// One entry per configured entity, in enumeration order
    pub per_entity: Vec<EntityAggregate>,
    /// Mean of per-column means; latency comes from the schema's latency column
    pub overall: MetricMeans,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<FlowTotals>,
    pub matched_columns: Vec<MatchedMetricColumns>,
    pub degraded: Vec<Degradation>,
    pub series_rows: usize,
    pub skipped_flow_records: usize,
    pub unmatched_flows: usize,
}

impl AggregateReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    pub fn is_metric_degraded(&self, metric: Metric) -> bool {
        self.degraded.iter().any(|d| d.metric == metric)
    }

    pub fn columns_for(&self, metric: Metric) -> &[String] {
        self.matched_columns
            .iter()
            .find(|m| m.metric == metric)
            .map(|m| m.columns.as_slice())
            .unwrap_or(&[])
    }
}

/// Per-timestep metrics table of one run
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesTable {
    pub run: String,
    pub columns: Vec<String>,
    /// Row-major values; unparseable cells are NaN
    pub rows: Vec<Vec<f64>>,
}

impl SeriesTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Values of the column at `position`
    pub fn values_at(&self, position: usize) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.get(position).copied().unwrap_or(f64::NAN))
            .collect()
    }

    /// Values of the named column
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        self.column_index(name).map(|i| self.values_at(i))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// How a comparison series was obtained
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SeriesOrigin {
    /// Read from the requested column
    Observed,
    /// Mean of these columns at each time step
    Synthesized { from: Vec<String> },
    /// No source column; all values are zero
    Defaulted,
}

/// One run's values of one metric over time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSeries {
    pub run: String,
    pub origin: SeriesOrigin,
    /// (time, value) pairs in table order
    pub points: Vec<(f64, f64)>,
}

/// All runs' series for one metric, in requested run order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSet {
    pub metric: String,
    pub series: Vec<ComparisonSeries>,
}

/// A run left out of the comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRun {
    pub run: String,
    pub reason: String,
}

/// Output of a run comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub runs_requested: Vec<String>,
    pub sets: Vec<ComparisonSet>,
    pub skipped_runs: Vec<SkippedRun>,
    pub warnings: Vec<String>,
}

impl ComparisonReport {
    pub fn set(&self, metric: &str) -> Option<&ComparisonSet> {
        self.sets.iter().find(|s| s.metric == metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_table_access() {
        let table = SeriesTable {
            run: "r".to_string(),
            columns: vec!["Time(s)".to_string(), "Avg_Latency(ms)".to_string()],
            rows: vec![vec![0.0, 5.0], vec![1.0]],
        };
        assert_eq!(table.column_index("Avg_Latency(ms)"), Some(1));
        assert!(!table.has_column("Jitter"));
        let latency = table.column("Avg_Latency(ms)").unwrap();
        assert_eq!(latency[0], 5.0);
        assert!(latency[1].is_nan());
    }

    #[test]
    fn test_metric_means_accessors() {
        let mut means = MetricMeans::default();
        means.set(Metric::Jitter, Some(1.5));
        assert_eq!(means.get(Metric::Jitter), Some(1.5));
        assert_eq!(means.get(Metric::Throughput), None);
    }
}
