//! JSON persistence for the provisioned config.
//! Writes go through the platform's atomic 0600 writer, so a child process
//! never observes a half-written file.

use std::fs;
use std::path::Path;
use tracing::debug;

use super::types::Config;
use crate::errors::HarnessError;
use crate::platform::write_config_0600;

/// Serialize `config` and replace the file at `path`.
pub fn write_config(path: &Path, config: &Config) -> Result<(), HarnessError> {
    let json = config.to_json()?;
    write_config_0600(path, json.as_bytes()).map_err(|source| HarnessError::Setup {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = json.len(), "Wrote config");
    Ok(())
}

/// Read a config written by [`write_config`] (or by hand).
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    use anyhow::Context;
    let content =
        fs::read_to_string(path).with_context(|| format!("read config '{}'", path.display()))?;
    let config = serde_json::from_str(&content)
        .with_context(|| format!("parse config '{}'", path.display()))?;
    Ok(config)
}
