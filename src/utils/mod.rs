//! Shared utilities: unit normalization and run workspaces.

pub mod units;
pub mod workspace;

pub use units::{normalize_to_ms, normalize_with_bare_unit, TimeUnit};
pub use workspace::{copy_input_files, setup_version_directory, RunWorkspace};
