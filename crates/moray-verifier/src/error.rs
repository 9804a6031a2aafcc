//! Error types for the verifier crate.

use moray_core::error::ClientError;
use thiserror::Error;

/// Result type for verifier operations.
pub type Result<T> = std::result::Result<T, VerifierError>;

/// Errors that can abort a comparison.
///
/// Data differences never appear here; they are returned in the report.
#[derive(Debug, Error)]
pub enum VerifierError {
    /// A connection or command failed on one of the sides.
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_passthrough() {
        let err: VerifierError = ClientError::Transport {
            command: "hello".to_string(),
            message: "connection refused".to_string(),
        }
        .into();

        assert_eq!(
            err.to_string(),
            "transport error during hello: connection refused"
        );
    }
}
