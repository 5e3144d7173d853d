//! Versioned schema descriptors for the supported input formats.
//!
//! A `TraceSchema` describes how a FlowMonitor trace is laid out; a
//! `SeriesSchema` describes the column conventions of a per-timestep metrics
//! table, including the `MetricRegistry` used for column discovery.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{SeriesFormat, TraceFormat, ValidationError};
use crate::utils::units::TimeUnit;

/// Tracked metric categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    Throughput,
    Latency,
    PacketLoss,
    Jitter,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Throughput,
        Metric::Latency,
        Metric::PacketLoss,
        Metric::Jitter,
    ];

    /// Human-readable name
    pub fn label(self) -> &'static str {
        match self {
            Metric::Throughput => "Throughput",
            Metric::Latency => "Latency",
            Metric::PacketLoss => "Packet Loss",
            Metric::Jitter => "Jitter",
        }
    }

    /// Unit of the values found in time-series columns
    pub fn series_unit(self) -> &'static str {
        match self {
            Metric::Throughput => "Kbps",
            Metric::Latency | Metric::Jitter => "ms",
            Metric::PacketLoss => "%",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Where the lost-packet counter of a flow comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LostPacketsSource {
    /// Use the `lostPackets` attribute, 0 when absent
    Reported,
    /// Always `txPackets - rxPackets`
    Derived,
    /// Use `lostPackets` when present, otherwise derive it
    ReportedOrDerived,
}

/// Layout of one supported flow-trace format
#[derive(Debug, Clone)]
pub struct TraceSchema {
    pub version: &'static str,
    /// Section holding one `flow_element` per flow with its counters
    pub stats_section: &'static str,
    /// Sections mapping flow ids to addresses and ports
    pub classifier_sections: &'static [&'static str],
    pub flow_element: &'static str,
    /// Unit assumed for time tokens without a suffix
    pub bare_time_unit: TimeUnit,
    pub lost_packets: LostPacketsSource,
}

impl TraceSchema {
    pub fn for_format(format: TraceFormat, bare_time_unit: Option<TimeUnit>) -> Self {
        let (version, lost_packets) = match format {
            TraceFormat::Ns3Flowmon => ("ns3-flowmon/1", LostPacketsSource::ReportedOrDerived),
            TraceFormat::Ns3FlowmonDerivedLoss => {
                ("ns3-flowmon-derived-loss/1", LostPacketsSource::Derived)
            }
        };
        Self {
            version,
            stats_section: "FlowStats",
            classifier_sections: &["Ipv4FlowClassifier", "Ipv6FlowClassifier"],
            flow_element: "Flow",
            bare_time_unit: bare_time_unit.unwrap_or(TimeUnit::Milliseconds),
            lost_packets,
        }
    }
}

/// Compiled column matcher for one metric
#[derive(Debug, Clone)]
pub struct MetricMatcher {
    pub metric: Metric,
    pub pattern: Regex,
}

impl MetricMatcher {
    pub fn matches(&self, column: &str) -> bool {
        self.pattern.is_match(column)
    }
}

/// A column assigned to a metric group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedColumn {
    pub name: String,
    /// Position of the column in the table
    pub position: usize,
    /// Entity the column belongs to, `None` for aggregate columns
    pub entity: Option<usize>,
}

/// Result of column discovery over one table header
#[derive(Debug, Clone, Default, Serialize)]
pub struct ColumnDiscovery {
    /// One entry per metric, in `Metric::ALL` order
    pub groups: Vec<(Metric, Vec<MatchedColumn>)>,
    /// Columns claimed by more than one metric
    pub collisions: Vec<(String, Vec<Metric>)>,
}

impl ColumnDiscovery {
    pub fn columns(&self, metric: Metric) -> &[MatchedColumn] {
        self.groups
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, cols)| cols.as_slice())
            .unwrap_or(&[])
    }

    pub fn column_names(&self, metric: Metric) -> Vec<String> {
        self.columns(metric).iter().map(|c| c.name.clone()).collect()
    }
}

/// Declared mapping from metric to column matcher
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    matchers: Vec<MetricMatcher>,
    entity_pattern: Regex,
}

impl MetricRegistry {
    pub fn new(matchers: Vec<MetricMatcher>, entity_pattern: Regex) -> Self {
        Self {
            matchers,
            entity_pattern,
        }
    }

    pub fn matcher(&self, metric: Metric) -> Option<&MetricMatcher> {
        self.matchers.iter().find(|m| m.metric == metric)
    }

    /// Entity index encoded in a column name, if any
    pub fn entity_of(&self, column: &str) -> Option<usize> {
        self.entity_pattern
            .captures(column)
            .and_then(|caps| caps.name("entity"))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Assign every column to the metric groups whose matcher accepts it.
    ///
    /// `skip` names columns that never join a group (the time axis).
    pub fn discover(&self, columns: &[String], skip: &[&str]) -> ColumnDiscovery {
        let mut discovery = ColumnDiscovery::default();

        for metric in Metric::ALL {
            let Some(matcher) = self.matcher(metric) else {
                discovery.groups.push((metric, Vec::new()));
                continue;
            };
            let matched = columns
                .iter()
                .enumerate()
                .filter(|(_, name)| !skip.contains(&name.as_str()) && matcher.matches(name))
                .map(|(position, name)| MatchedColumn {
                    name: name.clone(),
                    position,
                    entity: self.entity_of(name),
                })
                .collect();
            discovery.groups.push((metric, matched));
        }

        for name in columns {
            let claimed: Vec<Metric> = discovery
                .groups
                .iter()
                .filter(|(_, cols)| cols.iter().any(|c| &c.name == name))
                .map(|(m, _)| *m)
                .collect();
            if claimed.len() > 1 {
                discovery.collisions.push((name.clone(), claimed));
            }
        }

        discovery
    }
}

/// Column conventions of one supported time-series format
#[derive(Debug, Clone)]
pub struct SeriesSchema {
    pub version: &'static str,
    pub time_column: String,
    /// Column the overall latency figure is read from
    pub latency_column: String,
    pub registry: MetricRegistry,
}

impl SeriesSchema {
    /// Build the schema for a format, with entity columns named after `entity_prefix`
    pub fn build(format: SeriesFormat, entity_prefix: &str) -> Result<Self, ValidationError> {
        let prefix = regex::escape(entity_prefix);
        let (version, latency_column, entity_pattern) = match format {
            // UE_0_Throughput(Kbps), Avg_Latency(ms)
            SeriesFormat::LteMetricsV1 => (
                "lte-metrics/1",
                "Avg_Latency(ms)",
                format!(r"^{}_(?P<entity>\d+)_", prefix),
            ),
            // Throughput_UE0(Kbps), AvgDelay(ms)
            SeriesFormat::LteMetricsV2 => (
                "lte-metrics/2",
                "AvgDelay(ms)",
                format!(r"_{}_?(?P<entity>\d+)(?:\(|$)", prefix),
            ),
        };

        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                ValidationError::InvalidSeries(format!("bad column pattern '{}': {}", pattern, e))
            })
        };

        let matchers = vec![
            MetricMatcher {
                metric: Metric::Throughput,
                pattern: compile("Throughput")?,
            },
            MetricMatcher {
                metric: Metric::Latency,
                pattern: compile("Latency|Delay")?,
            },
            MetricMatcher {
                metric: Metric::PacketLoss,
                pattern: compile("PacketLoss")?,
            },
            MetricMatcher {
                metric: Metric::Jitter,
                pattern: compile("Jitter")?,
            },
        ];

        Ok(Self {
            version,
            time_column: "Time(s)".to_string(),
            latency_column: latency_column.to_string(),
            registry: MetricRegistry::new(matchers, compile(&entity_pattern)?),
        })
    }

    /// Discover metric columns in a header, never grouping the time column
    pub fn discover(&self, columns: &[String]) -> ColumnDiscovery {
        self.registry.discover(columns, &[self.time_column.as_str()])
    }
}
