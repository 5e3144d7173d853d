//! Flow and time-series analysis for LTE simulation runs.
//!
//! This module turns a FlowMonitor trace and a per-timestep metrics table into
//! per-entity aggregates, derived flow tables, plots and reports, and compares
//! metrics across runs.

pub mod types;
pub mod trace_parser;
pub mod classifier;
pub mod metrics;
pub mod series;
pub mod aggregator;
pub mod comparator;
pub mod plots;
pub mod report;
pub mod pipeline;

pub use types::*;
pub use trace_parser::{parse_trace_file, parse_trace_str, ParsedTrace};
pub use classifier::PortClassifier;
pub use metrics::{derive_metrics, entity_flow_stats, flow_totals};
pub use series::{load_series, read_series};
pub use aggregator::aggregate;
pub use comparator::{compare_runs, DirectorySeriesSource, SeriesSource};
pub use plots::{plot_comparison, plot_run, PlotSink, SvgPlotter};
pub use report::{generate_json_report, generate_markdown_report, write_flow_csv};
pub use pipeline::{Pipeline, RunInputs};
