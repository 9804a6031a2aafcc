//! Error types shared across the harness.

use thiserror::Error;

/// Errors from the MongoDB client wrapper.
///
/// Server-side command failures keep the server's error code and message
/// so callers can narrowly pattern-match the few transient conditions the
/// harness retries; everything else is treated as fatal.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection string could not be parsed.
    #[error("invalid connection string: {0}")]
    InvalidUri(String),

    /// The server rejected a command.
    #[error("command {command} failed with code {code} ({code_name}): {message}")]
    Command {
        /// Name of the command that failed.
        command: String,
        /// Server error code.
        code: i32,
        /// Server error code name.
        code_name: String,
        /// Server error message.
        message: String,
    },

    /// The command never produced a server reply (network, selection,
    /// or driver-internal failure).
    #[error("transport error during {command}: {message}")]
    Transport {
        /// Name of the command that failed.
        command: String,
        /// Driver error description.
        message: String,
    },
}

impl ClientError {
    /// Classifies a driver error for the given command.
    pub fn from_driver(command: impl Into<String>, err: mongodb::error::Error) -> Self {
        match *err.kind {
            mongodb::error::ErrorKind::Command(ref failure) => Self::Command {
                command: command.into(),
                code: failure.code,
                code_name: failure.code_name.clone(),
                message: failure.message.clone(),
            },
            _ => Self::Transport {
                command: command.into(),
                message: err.to_string(),
            },
        }
    }

    /// Returns the server error code, if the server replied with one.
    pub fn command_code(&self) -> Option<i32> {
        match self {
            Self::Command { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the server error message contains `pattern`.
    ///
    /// Used for the narrow transient-condition matching in the
    /// orchestrator; transport errors never match.
    pub fn message_contains(&self, pattern: &str) -> bool {
        match self {
            Self::Command { message, .. } => message.contains(pattern),
            _ => false,
        }
    }

    /// Returns true if the error is a transport-level failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Errors from the [`poll_until`](crate::poll::poll_until) combinator.
#[derive(Debug, Error)]
pub enum PollError<E: std::error::Error> {
    /// The wall-clock timeout elapsed before the condition held.
    ///
    /// `last_state` carries the most recent observation for diagnosis.
    #[error("timed out waiting for {condition}; last state: {last_state}")]
    TimedOut {
        /// Human-readable description of the awaited condition.
        condition: String,
        /// The last state the probe reported before the deadline.
        last_state: String,
    },

    /// The probe reported a fatal error; polling stopped immediately.
    #[error(transparent)]
    Fatal(E),
}
