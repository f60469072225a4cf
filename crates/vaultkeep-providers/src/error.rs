//! Error types for container control and process execution

use std::time::Duration;
use thiserror::Error;

/// Failure to run an external command at all (as opposed to a non-zero exit)
#[derive(Error, Debug)]
pub enum CommandError {
    /// Binary is not installed or not on PATH
    #[error("Command not found: {program}. Is it installed and in PATH?")]
    NotFound { program: String },

    /// Process could not be spawned or waited on
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Process exceeded the configured timeout and was killed
    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
}

/// Container control errors
#[derive(Error, Debug)]
pub enum ContainerError {
    /// The runtime ran but the stop/start command failed (includes timeouts)
    #[error("Failed to {action} container '{container}': {message}")]
    CommandFailed {
        container: String,
        action: &'static str,
        message: String,
    },

    /// The runtime could not report the container state
    #[error("Container runtime unreachable for '{container}': {message}")]
    Unreachable { container: String, message: String },
}

impl ContainerError {
    /// Create a command failed error
    pub fn command_failed(
        container: impl Into<String>,
        action: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            container: container.into(),
            action,
            message: message.into(),
        }
    }

    /// Create an unreachable error
    pub fn unreachable(container: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable {
            container: container.into(),
            message: message.into(),
        }
    }
}
