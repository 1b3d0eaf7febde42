//! Configuration loading.

use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use panel_core::PanelConfig;

/// Load the panel configuration from `path`, or defaults if it is absent.
pub fn load_config(path: &Path) -> Result<PanelConfig> {
    if !path.exists() {
        info!("{} not found, using defaults", path.display());
        return Ok(PanelConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = parse_config(&content).with_context(|| format!("invalid config in {}", path.display()))?;
    info!("loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse and validate a TOML configuration document.
pub fn parse_config(content: &str) -> Result<PanelConfig> {
    let config: PanelConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}
