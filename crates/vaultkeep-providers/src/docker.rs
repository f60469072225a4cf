//! Docker container controller

use crate::error::{CommandError, ContainerError};
use crate::traits::{ContainerController, ContainerHandle};
use crate::utils::{CommandRunner, SystemCommandRunner};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Controls a container through the `docker` CLI.
///
/// `stop` and `start` query the state first and skip the command when the
/// container is already where it should be. If the command fails, the state is
/// queried again: a container that reached the desired state anyway (operator
/// or orchestrator raced us) counts as success.
pub struct DockerController<R = SystemCommandRunner> {
    runner: R,
}

impl<R: CommandRunner> DockerController<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    async fn docker(&self, args: &[&str]) -> Result<crate::CommandOutput, CommandError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.runner.run("docker", &args).await
    }

    /// Run `docker stop|start` unless the container is already in the wanted state
    async fn transition(
        &self,
        handle: &ContainerHandle,
        action: &'static str,
        want_running: bool,
    ) -> Result<(), ContainerError> {
        if self.is_running(handle).await? == want_running {
            debug!(
                "Container '{}' already {}, skipping docker {}",
                handle,
                if want_running { "running" } else { "stopped" },
                action
            );
            return Ok(());
        }

        info!("Running docker {} for container '{}'", action, handle);
        let message = match self.docker(&[action, handle.name.as_str()]).await {
            Ok(output) if output.success() => {
                info!("Container '{}' {} completed", handle, action);
                return Ok(());
            }
            Ok(output) => output.failure_message(),
            Err(e) => e.to_string(),
        };

        if matches!(self.is_running(handle).await, Ok(state) if state == want_running) {
            warn!(
                "docker {} for '{}' failed ({}) but the container reached the expected state",
                action, handle, message
            );
            return Ok(());
        }

        Err(ContainerError::command_failed(&handle.name, action, message))
    }
}

#[async_trait]
impl<R: CommandRunner> ContainerController for DockerController<R> {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), ContainerError> {
        self.transition(handle, "stop", false).await
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<(), ContainerError> {
        self.transition(handle, "start", true).await
    }

    async fn is_running(&self, handle: &ContainerHandle) -> Result<bool, ContainerError> {
        let output = self
            .docker(&["inspect", "-f", "{{.State.Status}}", handle.name.as_str()])
            .await
            .map_err(|e| ContainerError::unreachable(&handle.name, e.to_string()))?;

        if !output.success() {
            return Err(ContainerError::unreachable(
                &handle.name,
                output.failure_message(),
            ));
        }

        let state = output.stdout.trim().to_lowercase();
        debug!("Container '{}' state: {}", handle, state);
        Ok(matches!(state.as_str(), "running" | "restarting"))
    }
}
