//! Per-run output directories and input staging.

use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};

/// Flow trace file name inside a run directory
pub const TRACE_FILE: &str = "flowmon.xml";
/// Time-series table file name inside a run directory
pub const SERIES_FILE: &str = "simulation_metrics.csv";
/// Inputs staged into a version directory
pub const INPUT_FILES: [&str; 2] = [TRACE_FILE, SERIES_FILE];

/// Output tree of one run: `<root>/plots` and `<root>/reports`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunWorkspace {
    pub root: PathBuf,
}

impl RunWorkspace {
    /// Create the directory tree; existing directories are kept
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let workspace = Self { root: root.into() };
        for dir in [workspace.plots_dir(), workspace.reports_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(workspace)
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.root.join("plots")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    pub fn flow_table_path(&self) -> PathBuf {
        self.reports_dir().join("flowmon_parsed.csv")
    }

    pub fn markdown_report_path(&self) -> PathBuf {
        self.reports_dir().join("simulation-report.md")
    }

    pub fn json_report_path(&self) -> PathBuf {
        self.reports_dir().join("aggregate_report.json")
    }
}

/// Create `<base_dir>/<version>` afresh, replacing any previous content
pub fn setup_version_directory(base_dir: &Path, version: &str) -> Result<RunWorkspace> {
    let version_dir = base_dir.join(version);
    if version_dir.exists() {
        log::warn!(
            "Version directory '{}' already exists. It will be overwritten.",
            version_dir.display()
        );
        fs::remove_dir_all(&version_dir)
            .with_context(|| format!("Failed to remove {}", version_dir.display()))?;
    }

    let workspace = RunWorkspace::create(&version_dir)?;
    log::info!("Created version directory at '{}'", version_dir.display());
    Ok(workspace)
}

/// Copy the run inputs found in `input_dir` to the workspace root.
///
/// Missing files are warned about, not treated as errors; the returned list
/// names the files that were copied.
pub fn copy_input_files(input_dir: &Path, workspace: &RunWorkspace) -> Result<Vec<&'static str>> {
    let mut copied = Vec::new();
    for file in INPUT_FILES {
        let src = input_dir.join(file);
        if !src.is_file() {
            log::warn!("'{}' not found in input directory '{}'", file, input_dir.display());
            continue;
        }
        let dst = workspace.root.join(file);
        fs::copy(&src, &dst)
            .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
        log::info!("Copied '{}' to {}", file, workspace.root.display());
        copied.push(file);
    }
    Ok(copied)
}

/// Sub-directories of `input_dir`, sorted by name
pub fn list_run_directories(input_dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("Failed to read input directory {}", input_dir.display()))?;

    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", input_dir.display()))?;
        if entry.path().is_dir() {
            runs.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    runs.sort();
    Ok(runs)
}
