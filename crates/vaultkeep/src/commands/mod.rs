//! CLI command implementations

pub mod backup;
pub mod list;
pub mod prune;
pub mod restore;
pub mod schedule;

use anyhow::{Context, Result};
use camino::Utf8Path;
use vaultkeep_core::VaultkeepConfig;

/// Load and validate the configuration file
pub(crate) fn load_config(path: &Utf8Path) -> Result<VaultkeepConfig> {
    VaultkeepConfig::load(path).with_context(|| format!("Failed to load configuration from {}", path))
}
