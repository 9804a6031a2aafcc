//! Validation error types.

use thiserror::Error;

/// A topology document violated the schema or an invariant.
///
/// Validation is fail-fast: the first violation wins and the config is
/// never partially accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The top-level value is not a JSON document.
    #[error("topology config must be a document")]
    NotADocument,

    /// The document did not match the schema (unknown field, wrong type,
    /// missing required field).
    #[error("malformed topology config: {0}")]
    Malformed(String),

    /// A replica set declared no members.
    #[error("replica set {set} has no members")]
    EmptyMembers {
        /// Replica set id.
        set: String,
    },

    /// The same host appears twice within one replica set.
    #[error("duplicate host {host} in replica set {set}")]
    DuplicateHost {
        /// Replica set id.
        set: String,
        /// The repeated host.
        host: String,
    },

    /// The same host appears in more than one place across a sharded
    /// topology.
    #[error("host {host} appears more than once across the topology")]
    DuplicateHostAcrossTopology {
        /// The repeated host.
        host: String,
    },

    /// More than one member has `arbiterOnly` set.
    #[error("replica set {set} declares more than one arbiter")]
    MultipleArbiters {
        /// Replica set id.
        set: String,
    },

    /// `votes` must be 0 or 1.
    #[error("member {host}: votes must be 0 or 1, got {votes}")]
    InvalidVotes {
        /// The offending member host.
        host: String,
        /// The declared vote count.
        votes: i32,
    },

    /// A non-voting member must carry priority 0.
    #[error("member {host}: votes=0 requires priority=0")]
    NonVoterNeedsZeroPriority {
        /// The offending member host.
        host: String,
    },

    /// The first member is reserved to become primary and must not carry
    /// `hidden`, `priority`, or `arbiterOnly`.
    #[error("first member {host} of replica set {set} must not set hidden, priority, or arbiterOnly")]
    FirstMemberOverride {
        /// Replica set id.
        set: String,
        /// The first member's host.
        host: String,
    },

    /// The member count is even, which a voting-sensitive flavor forbids.
    #[error("replica set {set} has an even number of members ({count})")]
    EvenMemberCount {
        /// Replica set id.
        set: String,
        /// The member count.
        count: usize,
    },

    /// Shard ids and the config-server id must be mutually unique.
    #[error("replica set id {id} is used more than once in the sharded topology")]
    DuplicateSetId {
        /// The repeated id.
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ValidationError::DuplicateHost {
            set: "rs0".to_string(),
            host: "a".to_string(),
        };
        assert_eq!(err.to_string(), "duplicate host a in replica set rs0");

        let err = ValidationError::NonVoterNeedsZeroPriority {
            host: "b".to_string(),
        };
        assert_eq!(err.to_string(), "member b: votes=0 requires priority=0");
    }
}
