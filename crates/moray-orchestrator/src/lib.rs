//! Moray Orchestrator - disposable MongoDB topologies in containers.
//!
//! This crate brings a validated [`TopologyConfig`] to life: it creates
//! one container per host, initiates each replica set with the first
//! member's priority elevated so it wins the election, bootstraps the
//! fixed harness accounts, registers shards on sharded clusters, and
//! tears everything down idempotently. It also exposes the fault
//! injection operations resilience tests drive: primary step-down,
//! primary restart, and packet-loss network interruption.
//!
//! # Overview
//!
//! - [`runtime`]: the container-runtime trait and specs
//! - [`docker`]: the Docker implementation over bollard
//! - [`provision`]: the provisioner state machine and teardown
//! - [`cluster`]: the running-cluster entity
//! - [`faults`]: fault-injection operations
//! - [`error`]: error types
//!
//! # Lifecycle
//!
//! `CREATING → CONTAINERS_RUNNING → RS_INITIATED → PRIMARY_ELECTED →
//! AUTH_BOOTSTRAPPED → (SHARDS_ADDED) → READY`, with `FAILED` reachable
//! from every step. There is no automatic rollback: on failure the
//! caller invokes [`Provisioner::destroy`], which tolerates containers
//! that never came up.
//!
//! # Example
//!
//! ```ignore
//! use moray_orchestrator::{DockerRuntime, Provisioner, ProvisionOptions, DestroyOptions};
//! use moray_topology::TopologyConfig;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TopologyConfig::from_value(&json!({
//!         "_id": "rs0",
//!         "members": [ { "host": "rs01" }, { "host": "rs02" }, { "host": "rs03" } ],
//!     }))?;
//!
//!     let runtime = DockerRuntime::connect().await?;
//!     let provisioner = Provisioner::new(runtime, ProvisionOptions::default());
//!
//!     let cluster = provisioner.provision(&config).await?;
//!     // ... run the migration tool against the cluster ...
//!     provisioner.destroy(&config, DestroyOptions::default()).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! [`TopologyConfig`]: moray_topology::TopologyConfig

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod cluster;
pub mod docker;
pub mod error;
pub mod faults;
pub mod provision;
pub mod runtime;

// Re-export commonly used types at the crate root
pub use cluster::{Cluster, ProvisionState};
pub use docker::DockerRuntime;
pub use error::{OrchestratorError, Result};
pub use provision::{
    wait_for_primary_with, DestroyOptions, MongodRole, Namespace, ProvisionOptions, Provisioner,
    ServiceRole, ToolProfile, KEYFILE_CONTAINER_PATH, PRIMARY_PRIORITY,
};
pub use runtime::{BindMount, ContainerRuntime, ContainerSpec, ExecOutput};
