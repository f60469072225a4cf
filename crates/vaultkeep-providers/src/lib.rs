//! Container runtime adapters for vaultkeep
//!
//! This crate provides the container control layer used by the backup and
//! restore pipelines:
//!
//! - [`ContainerController`]: the capability set `{stop, start, is_running}`
//! - [`DockerController`]: implementation shelling out to the `docker` client
//! - [`CommandRunner`]: process execution with an optional timeout, mockable in tests

pub mod docker;
pub mod error;
pub mod traits;
pub mod utils;

pub use docker::DockerController;
pub use error::{CommandError, ContainerError};
pub use traits::{ContainerController, ContainerHandle};
pub use utils::{CommandOutput, CommandRunner, SystemCommandRunner};

use std::time::Duration;

/// Create the default Docker controller with the given command timeout
pub fn create_controller(timeout: Option<Duration>) -> Box<dyn ContainerController> {
    Box::new(DockerController::new(SystemCommandRunner::new(timeout)))
}
