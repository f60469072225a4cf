//! # vaultkeep-core
//!
//! Core library for vaultkeep providing:
//! - Configuration file parsing (vaultkeep.yaml)
//! - Validation of every setting before any side effect
//! - Shared configuration types

pub mod config;
pub mod error;
pub mod types;

pub use config::VaultkeepConfig;
pub use error::{Error, Result};
