//! Topology invariant validation.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::config::{ReplicaSetSpec, TopologyConfig};
use crate::error::ValidationError;

/// Knobs for validation strictness.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    /// Require an odd member count per replica set.
    ///
    /// Voting-sensitive topology flavors turn this on; the default is
    /// relaxed.
    pub require_odd_members: bool,
}

impl ValidateOptions {
    /// Strict options for voting-sensitive flavors.
    pub fn voting_sensitive() -> Self {
        Self {
            require_odd_members: true,
        }
    }
}

impl TopologyConfig {
    /// Parses and validates a declarative topology document.
    ///
    /// Dispatches on shape (a `mongos` key means sharded), deserializes
    /// with an exact field whitelist, then checks every invariant,
    /// recursively for the config server and each shard. The first
    /// violation aborts; a config is never partially accepted.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        Self::from_value_with(value, ValidateOptions::default())
    }

    /// [`from_value`](Self::from_value) with explicit options.
    pub fn from_value_with(value: &Value, options: ValidateOptions) -> Result<Self, ValidationError> {
        let object = value.as_object().ok_or(ValidationError::NotADocument)?;

        let config = if object.contains_key("mongos") {
            Self::Sharded(
                serde_json::from_value(value.clone())
                    .map_err(|e| ValidationError::Malformed(e.to_string()))?,
            )
        } else {
            Self::ReplicaSet(
                serde_json::from_value(value.clone())
                    .map_err(|e| ValidationError::Malformed(e.to_string()))?,
            )
        };

        config.validate_with(options)?;
        Ok(config)
    }

    /// Checks the topology invariants on an already-typed config.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_with(ValidateOptions::default())
    }

    /// [`validate`](Self::validate) with explicit options.
    pub fn validate_with(&self, options: ValidateOptions) -> Result<(), ValidationError> {
        match self {
            Self::ReplicaSet(rs) => validate_replica_set(rs, options),
            Self::Sharded(sharded) => {
                validate_replica_set(&sharded.config_server, options)?;
                for shard in &sharded.shards {
                    validate_replica_set(shard, options)?;
                }

                // Shard ids and the config-server id are mutually unique.
                let mut ids = BTreeSet::new();
                for rs in self.replica_sets() {
                    if !ids.insert(rs.id.as_str()) {
                        return Err(ValidationError::DuplicateSetId { id: rs.id.clone() });
                    }
                }

                // Hosts are unique across the whole topology, mongos
                // included.
                let mut hosts = BTreeSet::new();
                for host in self.all_hosts() {
                    if !hosts.insert(host) {
                        return Err(ValidationError::DuplicateHostAcrossTopology {
                            host: host.to_string(),
                        });
                    }
                }

                Ok(())
            }
        }
    }
}

fn validate_replica_set(
    spec: &ReplicaSetSpec,
    options: ValidateOptions,
) -> Result<(), ValidationError> {
    if spec.members.is_empty() {
        return Err(ValidationError::EmptyMembers {
            set: spec.id.clone(),
        });
    }

    let mut hosts = BTreeSet::new();
    for member in &spec.members {
        if !hosts.insert(member.host.as_str()) {
            return Err(ValidationError::DuplicateHost {
                set: spec.id.clone(),
                host: member.host.clone(),
            });
        }
    }

    // The first member is reserved to become primary; the provisioner
    // elevates its priority, so the config must not fight it.
    let first = &spec.members[0];
    if first.has_primary_conflicting_overrides() {
        return Err(ValidationError::FirstMemberOverride {
            set: spec.id.clone(),
            host: first.host.clone(),
        });
    }

    if spec.members.iter().filter(|m| m.is_arbiter()).count() > 1 {
        return Err(ValidationError::MultipleArbiters {
            set: spec.id.clone(),
        });
    }

    for member in &spec.members {
        if let Some(votes) = member.votes {
            if !(0..=1).contains(&votes) {
                return Err(ValidationError::InvalidVotes {
                    host: member.host.clone(),
                    votes,
                });
            }
            if votes == 0 && member.priority != Some(0) {
                return Err(ValidationError::NonVoterNeedsZeroPriority {
                    host: member.host.clone(),
                });
            }
        }
    }

    if options.require_odd_members && spec.members.len() % 2 == 0 {
        return Err(ValidationError::EvenMemberCount {
            set: spec.id.clone(),
            count: spec.members.len(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_plain_replica_set() {
        let config = TopologyConfig::from_value(&json!({
            "_id": "rs1",
            "members": [ { "host": "a" }, { "host": "b" }, { "host": "c" } ],
        }))
        .unwrap();

        assert_eq!(config.primary_hosts(), vec!["a"]);
    }

    #[test]
    fn test_accepts_full_member_options() {
        let config = TopologyConfig::from_value(&json!({
            "_id": "rs1",
            "members": [
                { "host": "a" },
                { "host": "b", "hidden": true, "priority": 0, "secondaryDelaySecs": 60, "buildIndexes": false, "tags": { "dc": "west" } },
                { "host": "c", "arbiterOnly": true, "priority": 0 },
            ],
        }))
        .unwrap();

        assert_eq!(config.mongod_hosts().len(), 3);
    }

    #[test]
    fn test_rejects_non_document() {
        assert_eq!(
            TopologyConfig::from_value(&json!([1, 2])),
            Err(ValidationError::NotADocument)
        );
    }

    #[test]
    fn test_rejects_unknown_member_field() {
        let err = TopologyConfig::from_value(&json!({
            "_id": "rs1",
            "members": [ { "host": "a", "slaveDelay": 10 } ],
        }))
        .unwrap_err();

        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[test]
    fn test_rejects_duplicate_host() {
        let err = TopologyConfig::from_value(&json!({
            "_id": "rs1",
            "members": [ { "host": "a" }, { "host": "a" } ],
        }))
        .unwrap_err();

        assert_eq!(
            err,
            ValidationError::DuplicateHost {
                set: "rs1".to_string(),
                host: "a".to_string(),
            }
        );
    }

    #[test]
    fn test_rejects_two_arbiters() {
        let err = TopologyConfig::from_value(&json!({
            "_id": "rs1",
            "members": [
                { "host": "a" },
                { "host": "b", "arbiterOnly": true },
                { "host": "c", "arbiterOnly": true },
            ],
        }))
        .unwrap_err();

        assert_eq!(
            err,
            ValidationError::MultipleArbiters {
                set: "rs1".to_string(),
            }
        );
    }

    #[test]
    fn test_rejects_first_member_overrides() {
        for member in [
            json!({ "host": "a", "hidden": true }),
            json!({ "host": "a", "priority": 5 }),
            json!({ "host": "a", "arbiterOnly": true }),
        ] {
            let err = TopologyConfig::from_value(&json!({
                "_id": "rs1",
                "members": [ member, { "host": "b" } ],
            }))
            .unwrap_err();

            assert_eq!(
                err,
                ValidationError::FirstMemberOverride {
                    set: "rs1".to_string(),
                    host: "a".to_string(),
                }
            );
        }
    }

    #[test]
    fn test_rejects_nonvoter_with_priority() {
        let err = TopologyConfig::from_value(&json!({
            "_id": "rs1",
            "members": [ { "host": "a" }, { "host": "b", "votes": 0, "priority": 1 } ],
        }))
        .unwrap_err();

        assert_eq!(
            err,
            ValidationError::NonVoterNeedsZeroPriority {
                host: "b".to_string(),
            }
        );

        // Missing priority counts as the server default (1), so it is
        // rejected too.
        let err = TopologyConfig::from_value(&json!({
            "_id": "rs1",
            "members": [ { "host": "a" }, { "host": "b", "votes": 0 } ],
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NonVoterNeedsZeroPriority { .. }
        ));
    }

    #[test]
    fn test_rejects_out_of_range_votes() {
        let err = TopologyConfig::from_value(&json!({
            "_id": "rs1",
            "members": [ { "host": "a" }, { "host": "b", "votes": 2 } ],
        }))
        .unwrap_err();

        assert_eq!(
            err,
            ValidationError::InvalidVotes {
                host: "b".to_string(),
                votes: 2,
            }
        );
    }

    #[test]
    fn test_odd_member_rule_is_opt_in() {
        let two_members = json!({
            "_id": "rs1",
            "members": [ { "host": "a" }, { "host": "b" } ],
        });

        assert!(TopologyConfig::from_value(&two_members).is_ok());

        let err =
            TopologyConfig::from_value_with(&two_members, ValidateOptions::voting_sensitive())
                .unwrap_err();
        assert_eq!(
            err,
            ValidationError::EvenMemberCount {
                set: "rs1".to_string(),
                count: 2,
            }
        );
    }

    #[test]
    fn test_accepts_sharded() {
        let config = TopologyConfig::from_value(&json!({
            "mongos": "mongos",
            "configserver": { "_id": "cfg", "members": [ { "host": "cfg01" } ] },
            "shards": [
                { "_id": "sh0", "members": [ { "host": "sh001" } ] },
                { "_id": "sh1", "members": [ { "host": "sh101" } ] },
            ],
        }))
        .unwrap();

        assert_eq!(config.primary_hosts(), vec!["cfg01", "sh001", "sh101"]);
    }

    #[test]
    fn test_rejects_duplicate_set_id_across_shards() {
        let err = TopologyConfig::from_value(&json!({
            "mongos": "mongos",
            "configserver": { "_id": "rs", "members": [ { "host": "cfg01" } ] },
            "shards": [ { "_id": "rs", "members": [ { "host": "sh001" } ] } ],
        }))
        .unwrap_err();

        assert_eq!(
            err,
            ValidationError::DuplicateSetId {
                id: "rs".to_string(),
            }
        );
    }

    #[test]
    fn test_rejects_duplicate_host_across_shards() {
        let err = TopologyConfig::from_value(&json!({
            "mongos": "mongos",
            "configserver": { "_id": "cfg", "members": [ { "host": "cfg01" } ] },
            "shards": [
                { "_id": "sh0", "members": [ { "host": "n1" } ] },
                { "_id": "sh1", "members": [ { "host": "n1" } ] },
            ],
        }))
        .unwrap_err();

        assert_eq!(
            err,
            ValidationError::DuplicateHostAcrossTopology {
                host: "n1".to_string(),
            }
        );
    }

    #[test]
    fn test_rejects_mongos_host_colliding_with_member() {
        let err = TopologyConfig::from_value(&json!({
            "mongos": "sh001",
            "configserver": { "_id": "cfg", "members": [ { "host": "cfg01" } ] },
            "shards": [ { "_id": "sh0", "members": [ { "host": "sh001" } ] } ],
        }))
        .unwrap_err();

        assert_eq!(
            err,
            ValidationError::DuplicateHostAcrossTopology {
                host: "sh001".to_string(),
            }
        );
    }

    #[test]
    fn test_sharded_validates_nested_sets() {
        // An invariant violation inside a shard fails the whole config.
        let err = TopologyConfig::from_value(&json!({
            "mongos": "mongos",
            "configserver": { "_id": "cfg", "members": [ { "host": "cfg01" } ] },
            "shards": [ { "_id": "sh0", "members": [ { "host": "a" }, { "host": "a" } ] } ],
        }))
        .unwrap_err();

        assert_eq!(
            err,
            ValidationError::DuplicateHost {
                set: "sh0".to_string(),
                host: "a".to_string(),
            }
        );
    }

    #[test]
    fn test_rejects_empty_members() {
        let err = TopologyConfig::from_value(&json!({ "_id": "rs1", "members": [] })).unwrap_err();
        assert_eq!(
            err,
            ValidationError::EmptyMembers {
                set: "rs1".to_string(),
            }
        );
    }
}
