//! # lteflow - Flow and metrics analysis for ns-3 LTE simulation runs
//!
//! This library turns the output of an ns-3 LTE simulation into per-UE
//! statistics, plots and reports.
//!
//! ## Overview
//!
//! A run produces two files:
//!
//! - `flowmon.xml`: the FlowMonitor trace, one element per flow with packet and
//!   byte counters plus delay and jitter sums
//! - `simulation_metrics.csv`: one row per simulation time step with
//!   throughput, latency, packet-loss and jitter columns per UE
//!
//! Flows are assigned to UEs by destination port (`port_range_start + i` belongs
//! to UE `i`). Time tokens such as `"+1.5e+06ns"` are normalized to
//! milliseconds before any metric is derived.
//!
//! ## Architecture
//!
//! - `config`: Typed configuration sections and validation
//! - `config_loader`: YAML loading and CLI overrides
//! - `schema`: Versioned trace and time-series schema descriptors
//! - `diagnostics`: Observer that pipeline stages report to
//! - `error`: Error kinds of the pipeline
//! - `analysis`: Parsing, classification, derivation, aggregation, comparison,
//!   plots and reports
//! - `utils`: Unit normalization and run workspaces
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use lteflow::analysis::{Pipeline, RunInputs};
//! use lteflow::config::AnalyzerConfig;
//! use lteflow::diagnostics::LogDiagnostics;
//!
//! let pipeline = Pipeline::new(AnalyzerConfig::default())?;
//! let inputs = RunInputs::in_dir(Path::new("input/run_1"));
//! let analysis = pipeline.analyze("run_1", &inputs, &LogDiagnostics)?;
//!
//! println!("{:?}", analysis.report.overall);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Configuration Format
//!
//! Every section is optional:
//!
//! ```yaml
//! classifier:
//!   port_range_start: 5000
//!   entity_count: 5
//! throughput:
//!   unit: kbps
//!   convention: canonical        # or legacy-gbps-scaled
//! loss:
//!   convention: totals           # or per-flow-mean
//! comparison:
//!   metrics:
//!     - column: "Avg_PacketLoss(%)"
//!       missing:
//!         policy: mean-of-matching
//!         metric: packet-loss
//! ```
//!
//! ## Error Handling
//!
//! Core stages return `Result<T, AnalyzerError>`; output writers and the
//! binary use `color_eyre` for context-rich reports.

pub mod analysis;
pub mod config;
pub mod config_loader;
pub mod diagnostics;
pub mod error;
pub mod schema;
pub mod utils;

pub use error::AnalyzerError;
