//! Type definitions for vaultkeep configuration

mod config_types;

pub use config_types::*;
