//! End-to-end processing of one run or a batch of runs.
//!
//! `Pipeline::new` validates the configuration and builds the schemas and the
//! classifier before any file is touched. Each run is independent: batch
//! processing fans out with rayon and a failing run never aborts the others.

use std::path::{Path, PathBuf};

use color_eyre::eyre::Result;
use rayon::prelude::*;

use super::aggregator::aggregate;
use super::classifier::PortClassifier;
use super::plots::{plot_run, PlotSink};
use super::report::{generate_json_report, generate_markdown_report, write_flow_csv};
use super::series::load_series;
use super::trace_parser::parse_trace_file;
use super::types::*;
use crate::config::AnalyzerConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::AnalyzerError;
use crate::schema::{SeriesSchema, TraceSchema};
use crate::utils::workspace::{list_run_directories, RunWorkspace, SERIES_FILE, TRACE_FILE};

/// Input files of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInputs {
    pub trace: PathBuf,
    pub series: PathBuf,
}

impl RunInputs {
    /// `flowmon.xml` and `simulation_metrics.csv` inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            trace: dir.join(TRACE_FILE),
            series: dir.join(SERIES_FILE),
        }
    }
}

/// In-memory result of analyzing a run
#[derive(Debug, Clone)]
pub struct RunAnalysis {
    pub flows: FlowTable,
    pub series: SeriesTable,
    pub report: AggregateReport,
}

/// Files written for a processed run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: AggregateReport,
    pub workspace: RunWorkspace,
    pub flow_rows: usize,
    pub plots: Vec<PathBuf>,
}

/// Result of one run of a batch
#[derive(Debug)]
pub struct BatchRunResult {
    pub run: String,
    pub output_dir: PathBuf,
    pub outcome: Result<RunOutcome>,
}

/// Results of a batch, in run-name order
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub results: Vec<BatchRunResult>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> Vec<&BatchRunResult> {
        self.results.iter().filter(|r| r.outcome.is_err()).collect()
    }

    /// True when there was at least one run and none succeeded
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.succeeded() == 0
    }
}

/// Configured analysis pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: AnalyzerConfig,
    trace_schema: TraceSchema,
    series_schema: SeriesSchema,
    classifier: PortClassifier,
}

impl Pipeline {
    /// Validate the configuration and build the pipeline
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalyzerError> {
        config.validate()?;
        let classifier = PortClassifier::from_config(&config.classifier)?;
        let trace_schema = TraceSchema::for_format(config.trace.format, config.trace.bare_time_unit);
        let series_schema = SeriesSchema::build(config.series.format, &config.classifier.entity_prefix)?;

        log::debug!(
            "Pipeline ready: trace schema {}, series schema {}, {} entities from port {}",
            trace_schema.version,
            series_schema.version,
            config.classifier.entity_count,
            config.classifier.port_range_start
        );

        Ok(Self {
            config,
            trace_schema,
            series_schema,
            classifier,
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn series_schema(&self) -> &SeriesSchema {
        &self.series_schema
    }

    pub fn classifier(&self) -> &PortClassifier {
        &self.classifier
    }

    /// Parse and classify a trace into a flow table
    pub fn load_flows(
        &self,
        run: &str,
        trace_path: &Path,
        diagnostics: &dyn Diagnostics,
    ) -> Result<FlowTable, AnalyzerError> {
        let parsed = parse_trace_file(trace_path, &self.trace_schema, run, diagnostics)?;
        let mut records = parsed.records;
        let matched = self.classifier.classify_all(&mut records)?;

        diagnostics.emit(Diagnostic::info(
            run,
            format!(
                "classified {} of {} flows to {} entities",
                matched,
                records.len(),
                self.classifier.entity_count()
            ),
        ));

        Ok(FlowTable {
            run: run.to_string(),
            schema_version: self.trace_schema.version.to_string(),
            records,
            skipped_records: parsed.skipped,
            throughput: self.config.throughput,
        })
    }

    /// Read both inputs of a run and aggregate them, writing nothing
    pub fn analyze(
        &self,
        run: &str,
        inputs: &RunInputs,
        diagnostics: &dyn Diagnostics,
    ) -> Result<RunAnalysis, AnalyzerError> {
        let flows = self.load_flows(run, &inputs.trace, diagnostics)?;
        let series = load_series(&inputs.series, run)?;
        let report = aggregate(&series, Some(&flows), &self.series_schema, &self.config, diagnostics);

        Ok(RunAnalysis {
            flows,
            series,
            report,
        })
    }

    /// Analyze a run and write its flow table, plots and reports into `workspace`
    pub fn process_run(
        &self,
        run: &str,
        inputs: &RunInputs,
        workspace: &RunWorkspace,
        plotter: &dyn PlotSink,
        diagnostics: &dyn Diagnostics,
    ) -> Result<RunOutcome> {
        let analysis = self.analyze(run, inputs, diagnostics)?;

        let flow_rows = write_flow_csv(&analysis.flows, &self.config, &workspace.flow_table_path())?;
        let plots = plot_run(
            &analysis.series,
            &analysis.report,
            &self.series_schema,
            &workspace.plots_dir(),
            plotter,
        )?;
        generate_markdown_report(
            &analysis.report,
            &plots,
            self.config.throughput.unit,
            &workspace.markdown_report_path(),
        )?;
        generate_json_report(&analysis.report, &workspace.json_report_path())?;

        diagnostics.emit(Diagnostic::info(
            run,
            format!("analysis written to {}", workspace.root.display()),
        ));

        Ok(RunOutcome {
            report: analysis.report,
            workspace: workspace.clone(),
            flow_rows,
            plots,
        })
    }

    /// Process every sub-directory of `input_dir` as a run.
    ///
    /// Outputs go to `<output_dir>/<run>_output_<timestamp>`. Failures are
    /// recorded per run.
    pub fn process_batch(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        plotter: &dyn PlotSink,
        diagnostics: &dyn Diagnostics,
    ) -> Result<BatchSummary> {
        let runs = list_run_directories(input_dir)?;
        if runs.is_empty() {
            diagnostics.emit(Diagnostic::global(
                log::Level::Warn,
                format!("No run directories found in {}", input_dir.display()),
            ));
            return Ok(BatchSummary::default());
        }

        let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        diagnostics.emit(Diagnostic::global(
            log::Level::Info,
            format!("Processing {} runs from {}", runs.len(), input_dir.display()),
        ));

        let results: Vec<BatchRunResult> = runs
            .par_iter()
            .map(|run| {
                let output = output_dir.join(format!("{}_output_{}", run, timestamp));
                let outcome = RunWorkspace::create(&output).and_then(|workspace| {
                    let inputs = RunInputs::in_dir(&input_dir.join(run));
                    self.process_run(run, &inputs, &workspace, plotter, diagnostics)
                });
                if let Err(ref e) = outcome {
                    diagnostics.emit(Diagnostic::warn(run, format!("run failed: {}", e)));
                }
                BatchRunResult {
                    run: run.clone(),
                    output_dir: output,
                    outcome,
                }
            })
            .collect();

        let summary = BatchSummary { results };
        diagnostics.emit(Diagnostic::global(
            log::Level::Info,
            format!(
                "Batch complete: {} succeeded, {} failed",
                summary.succeeded(),
                summary.failed().len()
            ),
        ));
        Ok(summary)
    }
}
