//! The running-cluster entity.

use std::collections::BTreeMap;
use std::fmt;

use moray_core::auth::{CredentialRole, CredentialSet};
use moray_core::conn::ConnectionSource;
use moray_topology::TopologyConfig;
use serde::{Deserialize, Serialize};

/// Where a cluster is in its bring-up sequence.
///
/// `Failed` is reachable from every step. There is no automatic
/// rollback; the caller runs destroy, which is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisionState {
    /// Containers are being created.
    Creating,

    /// All containers are up.
    ContainersRunning,

    /// Every replica set has been initiated.
    RsInitiated,

    /// Every replica set has a writable primary.
    PrimaryElected,

    /// The harness accounts exist and authorization is live.
    AuthBootstrapped,

    /// All shards are registered (sharded topologies only).
    ShardsAdded,

    /// The topology is fully usable.
    Ready,

    /// Bring-up failed.
    Failed {
        /// What went wrong.
        error: String,
    },
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "CREATING"),
            Self::ContainersRunning => write!(f, "CONTAINERS_RUNNING"),
            Self::RsInitiated => write!(f, "RS_INITIATED"),
            Self::PrimaryElected => write!(f, "PRIMARY_ELECTED"),
            Self::AuthBootstrapped => write!(f, "AUTH_BOOTSTRAPPED"),
            Self::ShardsAdded => write!(f, "SHARDS_ADDED"),
            Self::Ready => write!(f, "READY"),
            Self::Failed { error } => write!(f, "FAILED({error})"),
        }
    }
}

/// A provisioned topology: the validated config plus the containers that
/// realize it, keyed by host name.
///
/// Created by [`Provisioner::provision`], destroyed by
/// [`Provisioner::destroy`].
///
/// [`Provisioner::provision`]: crate::provision::Provisioner::provision
/// [`Provisioner::destroy`]: crate::provision::Provisioner::destroy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// The topology this cluster realizes.
    pub config: TopologyConfig,

    /// Container ids keyed by host name.
    pub containers: BTreeMap<String, String>,

    /// Current lifecycle state.
    pub state: ProvisionState,

    credentials: CredentialSet,
}

impl Cluster {
    /// Creates a cluster record in the initial state.
    pub fn new(config: TopologyConfig, credentials: CredentialSet) -> Self {
        Self {
            config,
            containers: BTreeMap::new(),
            state: ProvisionState::Creating,
            credentials,
        }
    }

    /// Returns the container id for a host.
    pub fn container_id(&self, host: &str) -> Option<&str> {
        self.containers.get(host).map(String::as_str)
    }

    /// The first member of every replica set.
    pub fn primary_hosts(&self) -> Vec<&str> {
        self.config.primary_hosts()
    }

    /// True once bring-up completed.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, ProvisionState::Ready)
    }

    /// Builds a connection string authenticating as the given role.
    pub fn connection_string(&self, role: CredentialRole) -> String {
        self.config.connection_string(&self.credentials, role)
    }
}

impl ConnectionSource for Cluster {
    fn connection_uri(&self) -> String {
        self.connection_string(CredentialRole::Root)
    }
}
