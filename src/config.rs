use serde::{Deserialize, Serialize};

use crate::schema::Metric;
use crate::utils::units::TimeUnit;

/// Supported flow-trace formats
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TraceFormat {
    /// ns-3 FlowMonitor XML, `lostPackets` used when present
    #[default]
    Ns3Flowmon,
    /// ns-3 FlowMonitor XML, lost packets always derived from tx/rx counters
    Ns3FlowmonDerivedLoss,
}

/// Supported time-series column conventions
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SeriesFormat {
    /// `UE_0_Throughput(Kbps)`, `Avg_Latency(ms)`
    #[default]
    LteMetricsV1,
    /// `Throughput_UE0(Kbps)`, `AvgDelay(ms)`
    LteMetricsV2,
}

/// Output unit for flow throughput
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThroughputUnit {
    Bps,
    #[default]
    Kbps,
    Mbps,
    Gbps,
}

impl ThroughputUnit {
    /// Bits per second in one of this unit
    pub fn bits_per_second(self) -> f64 {
        match self {
            ThroughputUnit::Bps => 1.0,
            ThroughputUnit::Kbps => 1e3,
            ThroughputUnit::Mbps => 1e6,
            ThroughputUnit::Gbps => 1e9,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ThroughputUnit::Bps => "bps",
            ThroughputUnit::Kbps => "Kbps",
            ThroughputUnit::Mbps => "Mbps",
            ThroughputUnit::Gbps => "Gbps",
        }
    }
}

impl std::str::FromStr for ThroughputUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bps" => Ok(ThroughputUnit::Bps),
            "kbps" => Ok(ThroughputUnit::Kbps),
            "mbps" => Ok(ThroughputUnit::Mbps),
            "gbps" => Ok(ThroughputUnit::Gbps),
            other => Err(format!("unknown throughput unit '{}'", other)),
        }
    }
}

/// How flow duration is turned into throughput
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ThroughputConvention {
    /// Duration normalized to milliseconds, `bits / seconds`, scaled to the output unit
    #[default]
    Canonical,
    /// Raw numeric duration (suffix stripped, unscaled) read as seconds,
    /// computed in Gbps and then scaled to the output unit
    LegacyGbpsScaled,
}

/// How the trace-level loss rate is computed
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LossConvention {
    /// `(1 - total_rx / total_tx) * 100`
    #[default]
    Totals,
    /// Mean of per-flow loss rates
    PerFlowMean,
}

/// What the comparator does when a run lacks a requested metric column
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum MissingColumnPolicy {
    /// Leave the run out of this metric's comparison
    Skip,
    /// Emit a zero-valued series
    Zero,
    /// Mean of the columns the schema assigns to `metric`, zero if there are none
    MeanOfMatching { metric: Metric },
}

/// Destination-port classification settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub port_range_start: u16,
    pub entity_count: u16,
    /// Entity names are `{entity_prefix}_{index}`
    pub entity_prefix: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct TraceConfig {
    pub format: TraceFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bare_time_unit: Option<TimeUnit>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct SeriesConfig {
    pub format: SeriesFormat,
    /// Columns a run must have to be compared; empty means just the time column
    pub required_columns: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct ThroughputConfig {
    pub unit: ThroughputUnit,
    pub convention: ThroughputConvention,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct LossConfig {
    pub convention: LossConvention,
    /// Count flows with no transmitted packets (NaN loss) as 0% in means
    pub include_undefined_in_mean: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct TotalsConfig {
    /// Count unmatched flows in trace-wide totals
    pub include_unmatched: bool,
}

/// One metric column to compare across runs
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ComparisonMetric {
    pub column: String,
    #[serde(default = "default_missing_policy")]
    pub missing: MissingColumnPolicy,
}

fn default_missing_policy() -> MissingColumnPolicy {
    MissingColumnPolicy::Skip
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ComparisonConfig {
    pub metrics: Vec<ComparisonMetric>,
}

/// Complete analyzer configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub classifier: ClassifierConfig,
    pub trace: TraceConfig,
    pub series: SeriesConfig,
    pub throughput: ThroughputConfig,
    pub loss: LossConfig,
    pub totals: TotalsConfig,
    pub comparison: ComparisonConfig,
}

impl AnalyzerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let classifier = &self.classifier;
        if classifier.entity_count == 0 {
            return Err(ValidationError::InvalidClassifier(
                "entity_count must be at least 1".to_string(),
            ));
        }
        let range_end = classifier.port_range_start as u32 + classifier.entity_count as u32;
        if range_end > u16::MAX as u32 + 1 {
            return Err(ValidationError::InvalidClassifier(format!(
                "port range {}..{} exceeds the highest port 65535",
                classifier.port_range_start, range_end
            )));
        }
        if classifier.entity_prefix.trim().is_empty() {
            return Err(ValidationError::InvalidClassifier(
                "entity_prefix cannot be empty".to_string(),
            ));
        }

        if self.series.required_columns.iter().any(|c| c.trim().is_empty()) {
            return Err(ValidationError::InvalidSeries(
                "required_columns cannot contain empty names".to_string(),
            ));
        }

        for metric in &self.comparison.metrics {
            if metric.column.trim().is_empty() {
                return Err(ValidationError::InvalidComparison(
                    "metric column cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Name of entity `index`
    pub fn entity_name(&self, index: usize) -> String {
        format!("{}_{}", self.classifier.entity_prefix, index)
    }

    /// Entity names in enumeration order
    pub fn entity_names(&self) -> Vec<String> {
        (0..self.classifier.entity_count as usize)
            .map(|i| self.entity_name(i))
            .collect()
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid classifier configuration: {0}")]
    InvalidClassifier(String),
    #[error("Invalid series configuration: {0}")]
    InvalidSeries(String),
    #[error("Invalid comparison configuration: {0}")]
    InvalidComparison(String),
}

/// Default implementations
impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            port_range_start: 5000,
            entity_count: 5,
            entity_prefix: "UE".to_string(),
        }
    }
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            metrics: vec![
                ComparisonMetric {
                    column: "Avg_Throughput(Kbps)".to_string(),
                    missing: MissingColumnPolicy::Skip,
                },
                ComparisonMetric {
                    column: "Avg_Latency(ms)".to_string(),
                    missing: MissingColumnPolicy::Skip,
                },
                ComparisonMetric {
                    column: "Avg_PacketLoss(%)".to_string(),
                    missing: MissingColumnPolicy::MeanOfMatching {
                        metric: Metric::PacketLoss,
                    },
                },
            ],
        }
    }
}
