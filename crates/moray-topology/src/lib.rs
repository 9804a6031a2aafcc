//! Moray Topology - declarative cluster model and validator.
//!
//! This crate parses and validates the declarative topology documents the
//! harness consumes, and exposes the derived read-only views everything
//! else is built on (layout, connection strings, host lists).
//!
//! # Config schema
//!
//! Replica set:
//!
//! ```json
//! { "_id": "rs0", "members": [ { "host": "rs01" }, { "host": "rs02", "hidden": true, "priority": 0 } ] }
//! ```
//!
//! Sharded cluster:
//!
//! ```json
//! {
//!   "mongos": "mongos",
//!   "configserver": { "_id": "cfg", "members": [ { "host": "cfg01" } ] },
//!   "shards": [ { "_id": "sh0", "members": [ { "host": "sh001" } ] } ]
//! }
//! ```
//!
//! # Validation
//!
//! [`TopologyConfig::from_value`] performs structural validation (member
//! field whitelist, types) and then checks the topology invariants,
//! recursively for the config server and every shard. It fails fast on
//! the first violation and never partially accepts a document.
//!
//! # Example
//!
//! ```
//! use moray_topology::TopologyConfig;
//! use serde_json::json;
//!
//! let config = TopologyConfig::from_value(&json!({
//!     "_id": "rs0",
//!     "members": [ { "host": "a" }, { "host": "b" }, { "host": "c" } ],
//! }))
//! .unwrap();
//!
//! assert_eq!(config.primary_hosts(), vec!["a"]);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod validate;

pub use config::{
    direct_connection_string, host_with_port, Layout, MemberSpec, ReplicaSetSpec, ShardedSpec,
    TopologyConfig, DEFAULT_PORT,
};
pub use error::ValidationError;
pub use validate::ValidateOptions;
