//! Configuration loading and validation

mod loader;

pub use loader::VaultkeepConfig;
