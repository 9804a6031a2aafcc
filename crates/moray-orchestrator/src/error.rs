//! Error types for the orchestrator crate.

use std::time::Duration;

use moray_core::error::ClientError;
use thiserror::Error;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur while provisioning or perturbing a topology.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Container not found.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Network not found.
    #[error("network not found: {0}")]
    NetworkNotFound(String),

    /// Container creation failed.
    #[error("failed to create container {name}: {reason}")]
    ContainerCreationFailed {
        /// The container name.
        name: String,
        /// The reason for the failure.
        reason: String,
    },

    /// A command executed inside a container failed; the captured output
    /// is kept for diagnosis.
    #[error("command {command} in container {container} failed (exit {exit_code}): {output}")]
    CommandFailed {
        /// The container name.
        container: String,
        /// The command that failed.
        command: String,
        /// Process exit code (0 when the server replied `ok: 0`).
        exit_code: i32,
        /// Captured stdout/stderr or server error text.
        output: String,
    },

    /// A replica set could not be initiated.
    #[error("replica set {set} failed to initiate: {reason}")]
    InitiateFailed {
        /// Replica set id.
        set: String,
        /// The reason for the failure.
        reason: String,
    },

    /// No writable primary appeared within the timeout.
    #[error("no primary elected on {host} within {timeout:?}; last state: {last_state}")]
    ElectionTimeout {
        /// The polled host.
        host: String,
        /// The exhausted wall-clock budget.
        timeout: Duration,
        /// The last observed hello state.
        last_state: String,
    },

    /// Authorization bootstrap failed.
    #[error("authorization bootstrap failed on {host}: {reason}")]
    AuthorizationFailed {
        /// The host the users were created through.
        host: String,
        /// The reason for the failure.
        reason: String,
    },

    /// A shard could not be registered.
    #[error("failed to add shard {shard}: {reason}")]
    AddShardFailed {
        /// Shard replica-set id.
        shard: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Generic timeout waiting for an observable condition.
    #[error("timeout waiting for {condition}; last state: {last_state}")]
    Timeout {
        /// The awaited condition.
        condition: String,
        /// The last observed state.
        last_state: String,
    },

    /// Teardown completed with failures.
    #[error("teardown failed: {0}")]
    TeardownFailed(String),

    /// The operation does not apply to the given topology shape.
    #[error("unsupported topology: {0}")]
    UnsupportedTopology(String),

    /// Docker API error.
    #[error("Docker API error: {0}")]
    Runtime(#[from] bollard::errors::Error),

    /// MongoDB client error.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl OrchestratorError {
    /// Creates a container not found error.
    pub fn container_not_found(name: impl Into<String>) -> Self {
        Self::ContainerNotFound(name.into())
    }

    /// Creates a network not found error.
    pub fn network_not_found(name: impl Into<String>) -> Self {
        Self::NetworkNotFound(name.into())
    }

    /// Creates a container creation failed error.
    pub fn container_creation_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ContainerCreationFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a command failed error.
    pub fn command_failed(
        container: impl Into<String>,
        command: impl Into<String>,
        exit_code: i32,
        output: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            container: container.into(),
            command: command.into(),
            exit_code,
            output: output.into(),
        }
    }

    /// Creates an initiate failed error.
    pub fn initiate_failed(set: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InitiateFailed {
            set: set.into(),
            reason: reason.into(),
        }
    }

    /// Creates an authorization failed error.
    pub fn authorization_failed(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AuthorizationFailed {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Creates an add shard failed error.
    pub fn add_shard_failed(shard: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AddShardFailed {
            shard: shard.into(),
            reason: reason.into(),
        }
    }

    /// Creates a teardown failed error.
    pub fn teardown_failed(reason: impl Into<String>) -> Self {
        Self::TeardownFailed(reason.into())
    }

    /// Returns true if this is a not-found error, which teardown paths
    /// swallow to stay idempotent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ContainerNotFound(_) | Self::NetworkNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::container_not_found("rs01");
        assert_eq!(err.to_string(), "container not found: rs01");

        let err = OrchestratorError::ElectionTimeout {
            host: "rs01".to_string(),
            timeout: Duration::from_secs(30),
            last_state: "isWritablePrimary=false primary=<none>".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no primary elected on rs01 within 30s; last state: isWritablePrimary=false primary=<none>"
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(OrchestratorError::container_not_found("x").is_not_found());
        assert!(OrchestratorError::network_not_found("x").is_not_found());
        assert!(!OrchestratorError::teardown_failed("x").is_not_found());
    }
}
