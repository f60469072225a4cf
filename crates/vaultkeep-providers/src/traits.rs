//! Container controller trait definitions

use crate::error::ContainerError;
use async_trait::async_trait;
use std::fmt;

/// Name or id of the application's container.
///
/// The real state lives in the container runtime and can change between a
/// query and a command, so no running flag is cached here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub name: String,
}

impl ContainerHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Capability set the pipelines need from a container runtime
#[async_trait]
pub trait ContainerController: Send + Sync {
    /// Get the runtime name
    fn name(&self) -> &'static str;

    /// Stop the container. Stopping a stopped container is a no-op success.
    async fn stop(&self, handle: &ContainerHandle) -> Result<(), ContainerError>;

    /// Start the container. Starting a running container is a no-op success.
    async fn start(&self, handle: &ContainerHandle) -> Result<(), ContainerError>;

    /// Report whether the container is currently running
    async fn is_running(&self, handle: &ContainerHandle) -> Result<bool, ContainerError>;
}
