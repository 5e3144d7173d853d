use crate::config::{AnalyzerConfig, ThroughputUnit};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::Path;

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<AnalyzerConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration file '{}'", config_path.display()))?;

    let config: AnalyzerConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration file '{}'", config_path.display()))?;

    config.validate()?;

    Ok(config)
}

/// Load the configuration file if one was given, defaults otherwise
pub fn load_or_default(config_path: Option<&Path>) -> Result<AnalyzerConfig> {
    match config_path {
        Some(path) => load_config(path),
        None => Ok(AnalyzerConfig::default()),
    }
}

/// CLI arguments that can override YAML settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port_range_start: Option<u16>,
    pub entity_count: Option<u16>,
    pub throughput_unit: Option<ThroughputUnit>,
}

/// Apply CLI overrides to a configuration
pub fn apply_overrides(config: &mut AnalyzerConfig, overrides: &CliOverrides) -> Result<()> {
    if let Some(start) = overrides.port_range_start {
        info!("Overriding port range start: {}", start);
        config.classifier.port_range_start = start;
    }

    if let Some(count) = overrides.entity_count {
        info!("Overriding entity count: {}", count);
        config.classifier.entity_count = count;
    }

    if let Some(unit) = overrides.throughput_unit {
        info!("Overriding throughput unit: {}", unit.label());
        config.throughput.unit = unit;
    }

    // Re-validate after applying overrides
    config.validate()?;

    Ok(())
}
