//! Command-line analyzer for ns-3 LTE simulation runs.
//!
//! Processes a single versioned run, a batch of runs, or compares metrics
//! across runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};

use lteflow::analysis::comparator::{required_columns, resolve_metrics};
use lteflow::analysis::{self, DirectorySeriesSource, Pipeline, RunInputs, SvgPlotter};
use lteflow::config::ThroughputUnit;
use lteflow::config_loader::{apply_overrides, load_or_default, CliOverrides};
use lteflow::diagnostics::LogDiagnostics;
use lteflow::utils::{copy_input_files, setup_version_directory};
use lteflow::AnalyzerError;

#[derive(Parser)]
#[command(name = "lteflow")]
#[command(about = "Flow and metrics analysis for ns-3 LTE simulation runs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,

    /// First destination port of the UE range
    #[arg(long, global = true)]
    port_start: Option<u16>,

    /// Number of UEs
    #[arg(long, global = true)]
    num_ue: Option<u16>,

    /// Output unit for flow throughput (bps, kbps, mbps, gbps)
    #[arg(long, global = true)]
    throughput_unit: Option<ThroughputUnit>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one run into versions/<version>
    Analyze {
        /// Version identifier for the run (e.g. v1, v2)
        #[arg(long = "version", value_name = "VERSION")]
        run_version: String,

        /// Directory containing flowmon.xml and simulation_metrics.csv
        #[arg(long, default_value = "input/")]
        input_dir: PathBuf,

        /// Directory holding one sub-directory per version
        #[arg(long, default_value = "versions")]
        versions_dir: PathBuf,
    },

    /// Analyze every run directory under the input directory
    Batch {
        /// Directory with one sub-directory per run
        #[arg(long, default_value = "input/")]
        input_dir: PathBuf,

        /// Directory receiving <run>_output_<timestamp> directories
        #[arg(long, default_value = "output/")]
        output_dir: PathBuf,
    },

    /// Compare time-series metrics across runs
    Compare {
        /// Run directories to compare, in plot order
        #[arg(long, value_delimiter = ',', required = true)]
        runs: Vec<String>,

        /// Metric columns to compare (defaults to the configured metrics)
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,

        /// Directory with one sub-directory per run
        #[arg(long, default_value = "input/")]
        input_dir: PathBuf,

        /// Directory receiving the comparison plots
        #[arg(long, default_value = "output/comparison_plots")]
        output_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    // Set thread pool size
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let mut config = load_or_default(cli.config.as_deref())?;
    apply_overrides(
        &mut config,
        &CliOverrides {
            port_range_start: cli.port_start,
            entity_count: cli.num_ue,
            throughput_unit: cli.throughput_unit,
        },
    )?;
    let pipeline = Pipeline::new(config).context("Invalid analyzer configuration")?;

    match cli.command {
        Commands::Analyze {
            run_version,
            input_dir,
            versions_dir,
        } => run_analyze(&pipeline, &run_version, &input_dir, &versions_dir),
        Commands::Batch {
            input_dir,
            output_dir,
        } => run_batch(&pipeline, &input_dir, &output_dir),
        Commands::Compare {
            runs,
            metrics,
            input_dir,
            output_dir,
        } => run_compare(&pipeline, &runs, &metrics, &input_dir, &output_dir),
    }
}

fn run_analyze(pipeline: &Pipeline, version: &str, input_dir: &Path, versions_dir: &Path) -> Result<()> {
    let workspace = setup_version_directory(versions_dir, version)?;
    copy_input_files(input_dir, &workspace)?;

    let inputs = RunInputs::in_dir(&workspace.root);
    for required in [&inputs.trace, &inputs.series] {
        if !required.is_file() {
            log::error!("{} does not exist", required.display());
            process::exit(1);
        }
    }

    match pipeline.process_run(version, &inputs, &workspace, &SvgPlotter::default(), &LogDiagnostics) {
        Ok(outcome) => {
            analysis::report::print_summary(&outcome.report);
            log::info!("Analysis for version '{}' completed successfully", version);
            Ok(())
        }
        Err(e) => {
            if e.downcast_ref::<AnalyzerError>().is_some_and(|e| e.is_missing_input()) {
                log::error!("{}", e);
                process::exit(1);
            }
            Err(e)
        }
    }
}

fn run_batch(pipeline: &Pipeline, input_dir: &Path, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let summary = pipeline.process_batch(input_dir, output_dir, &SvgPlotter::default(), &LogDiagnostics)?;

    println!("\n=== BATCH SUMMARY ===\n");
    for result in &summary.results {
        match &result.outcome {
            Ok(_) => println!("  [ok]     {} -> {}", result.run, result.output_dir.display()),
            Err(e) => println!("  [failed] {}: {}", result.run, e),
        }
    }
    println!(
        "\n{} succeeded, {} failed. Results saved to: {}\n",
        summary.succeeded(),
        summary.failed().len(),
        output_dir.display()
    );

    if summary.all_failed() {
        process::exit(1);
    }
    Ok(())
}

fn run_compare(
    pipeline: &Pipeline,
    runs: &[String],
    metrics: &[String],
    input_dir: &Path,
    output_dir: &Path,
) -> Result<()> {
    let config = pipeline.config();
    let metrics = if metrics.is_empty() {
        config.comparison.metrics.clone()
    } else {
        resolve_metrics(metrics, config)
    };
    let schema = pipeline.series_schema();

    let report = analysis::compare_runs(
        &DirectorySeriesSource::new(input_dir),
        runs,
        &metrics,
        schema,
        &required_columns(schema, config),
        &LogDiagnostics,
    );

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;
    analysis::plot_comparison(&report, output_dir, &SvgPlotter::default())?;
    analysis::generate_json_report(&report, &output_dir.join("comparison_report.json"))?;
    analysis::report::print_comparison_summary(&report);

    log::info!("Comparative plots saved in: {}", output_dir.display());
    Ok(())
}
