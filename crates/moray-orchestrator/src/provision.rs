//! The provisioner: declarative topology in, running cluster out.
//!
//! Bring-up walks the state machine documented on
//! [`ProvisionState`](crate::cluster::ProvisionState). Independent
//! replica sets (each shard, the config server) are handled by a bounded
//! worker pool sized to the set count; within one replica set the steps
//! are strictly sequential because each depends on the previous step's
//! externally observable effect.
//!
//! Two commands are unreachable through an unauthenticated remote driver
//! connection on a keyfile cluster: `replSetInitiate` and the creation
//! of the first user. Those two go through the raw admin-eval channel
//! (a `mongosh` exec inside the container), with the command document
//! serialized by serde rather than composed as shell text. Everything
//! else uses the driver.

use std::path::PathBuf;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use mongodb::bson::{doc, Bson, Document};
use moray_core::auth::{CredentialRole, Credentials, CredentialSet};
use moray_core::client::{HelloStatus, MongoHandle};
use moray_core::error::{ClientError, PollError};
use moray_core::poll::{poll_until, PollConfig, PollStatus};
use moray_topology::{
    direct_connection_string, host_with_port, MemberSpec, ReplicaSetSpec, ShardedSpec,
    TopologyConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cluster::{Cluster, ProvisionState};
use crate::error::{OrchestratorError, Result};
use crate::runtime::{BindMount, ContainerRuntime, ContainerSpec};

/// Where the shared keyfile is mounted inside every container.
pub const KEYFILE_CONTAINER_PATH: &str = "/etc/moray/keyfile";

/// Priority assigned to the first member so it wins the initial election.
pub const PRIMARY_PRIORITY: i32 = 1000;

/// A database/collection pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Database name.
    pub database: String,

    /// Collection name.
    pub collection: String,
}

impl Namespace {
    /// Creates a namespace.
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// A role grant in a `createUser` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRole {
    /// Role name.
    pub role: String,

    /// Database the role is granted on.
    pub db: String,
}

impl ServiceRole {
    /// Creates a role grant.
    pub fn new(role: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            db: db.into(),
        }
    }
}

/// Tool-specific extension point.
///
/// The four migration tools the harness qualifies share one provisioner
/// and verifier; what differs between them is captured here: extra
/// mongod arguments, the bookkeeping databases excluded from
/// verification, the role set of the tool's service account, and where
/// in-flight backup/PITR operations can be observed for the destroy
/// drain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolProfile {
    /// Tool name, for logging.
    pub name: String,

    /// Extra arguments appended to every mongod command line.
    pub extra_mongod_args: Vec<String>,

    /// The tool's own bookkeeping databases, excluded from verification.
    pub bookkeeping_databases: Vec<String>,

    /// Roles granted to the tool's service account.
    pub service_roles: Vec<ServiceRole>,

    /// Where in-flight operations are recorded, if the tool has such a
    /// collection; enables the destroy-time drain.
    pub active_operation_namespace: Option<Namespace>,

    /// Filter selecting in-flight operations in that collection.
    pub active_operation_filter: Document,
}

impl Default for ToolProfile {
    fn default() -> Self {
        Self {
            name: "generic".to_string(),
            extra_mongod_args: Vec::new(),
            bookkeeping_databases: Vec::new(),
            service_roles: vec![
                ServiceRole::new("backup", "admin"),
                ServiceRole::new("restore", "admin"),
                ServiceRole::new("clusterMonitor", "admin"),
                ServiceRole::new("readWriteAnyDatabase", "admin"),
            ],
            active_operation_namespace: None,
            active_operation_filter: doc! {},
        }
    }
}

impl ToolProfile {
    /// Creates a profile with the default role set and the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends a mongod argument.
    pub fn extra_mongod_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_mongod_args.push(arg.into());
        self
    }

    /// Registers a bookkeeping database.
    pub fn bookkeeping_database(mut self, db: impl Into<String>) -> Self {
        self.bookkeeping_databases.push(db.into());
        self
    }

    /// Replaces the service-account role set.
    pub fn service_roles(mut self, roles: Vec<ServiceRole>) -> Self {
        self.service_roles = roles;
        self
    }

    /// Sets where in-flight operations are observed.
    pub fn active_operations(mut self, namespace: Namespace, filter: Document) -> Self {
        self.active_operation_namespace = Some(namespace);
        self.active_operation_filter = filter;
        self
    }
}

/// Provisioner configuration.
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Container image for mongod and mongos.
    pub image: String,

    /// Name of the cluster bridge network.
    pub network: String,

    /// Host path of the shared keyfile, mounted read-only into every
    /// container. Must exist with mode 0600 before provisioning.
    pub keyfile_path: PathBuf,

    /// Port every server listens on inside its container.
    pub port: u16,

    /// Fixed interval for every polling loop.
    pub poll_interval: Duration,

    /// Wall-clock budget for a replica set to accept `replSetInitiate`.
    pub initiate_timeout: Duration,

    /// Wall-clock budget for a primary to appear.
    pub election_timeout: Duration,

    /// Wall-clock budget for the destroy-time backup drain.
    pub drain_timeout: Duration,

    /// The harness account set to bootstrap.
    pub credentials: CredentialSet,

    /// Tool-specific extension point.
    pub tool: ToolProfile,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            image: "mongo:7.0".to_string(),
            network: "moray-net".to_string(),
            keyfile_path: PathBuf::from("/tmp/moray-keyfile"),
            port: moray_topology::DEFAULT_PORT,
            poll_interval: Duration::from_secs(1),
            initiate_timeout: Duration::from_secs(60),
            election_timeout: Duration::from_secs(120),
            drain_timeout: Duration::from_secs(120),
            credentials: CredentialSet::for_harness(),
            tool: ToolProfile::default(),
        }
    }
}

/// Options for [`Provisioner::destroy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DestroyOptions {
    /// Drain in-flight backup/PITR operations before removing
    /// containers.
    pub cleanup_backups: bool,
}

impl DestroyOptions {
    /// Options that drain in-flight operations first.
    pub fn draining() -> Self {
        Self {
            cleanup_backups: true,
        }
    }
}

/// Which flavor of mongod a container runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MongodRole {
    /// Plain replica-set member.
    Replica,

    /// Shard member (`--shardsvr`).
    Shard,

    /// Config-server member (`--configsvr`).
    ConfigServer,
}

impl MongodRole {
    /// Label value for the role.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Replica => "replica",
            Self::Shard => "shard",
            Self::ConfigServer => "configsvr",
        }
    }
}

/// Brings declarative topologies up and tears them down.
pub struct Provisioner<R> {
    runtime: R,
    options: ProvisionOptions,
}

impl<R: ContainerRuntime> Provisioner<R> {
    /// Creates a provisioner over the given runtime.
    pub fn new(runtime: R, options: ProvisionOptions) -> Self {
        Self { runtime, options }
    }

    /// Returns the configuration.
    pub fn options(&self) -> &ProvisionOptions {
        &self.options
    }

    /// Returns the container runtime.
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Brings the whole topology up and returns the running cluster.
    ///
    /// On failure the partially-created containers are left in place;
    /// there is no automatic rollback. Call [`destroy`](Self::destroy),
    /// which tolerates whatever subset exists.
    pub async fn provision(&self, config: &TopologyConfig) -> Result<Cluster> {
        info!(
            layout = %config.layout(),
            hosts = config.all_hosts().len(),
            tool = %self.options.tool.name,
            "Provisioning topology"
        );

        let mut cluster = Cluster::new(config.clone(), self.options.credentials.clone());

        match self.bring_up(config, &mut cluster).await {
            Ok(()) => {
                self.transition(&mut cluster, ProvisionState::Ready);
                Ok(cluster)
            }
            Err(e) => {
                error!(error = %e, "Provisioning failed");
                self.transition(
                    &mut cluster,
                    ProvisionState::Failed {
                        error: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn bring_up(&self, config: &TopologyConfig, cluster: &mut Cluster) -> Result<()> {
        self.transition(cluster, ProvisionState::Creating);
        self.runtime.create_network(&self.options.network).await?;

        let memory = per_container_memory(
            self.runtime.host_memory_bytes().await?,
            config.all_hosts().len(),
        );

        self.create_mongod_containers(config, memory, cluster)
            .await?;
        self.transition(cluster, ProvisionState::ContainersRunning);

        // Independent replica sets run in a pool sized to the set count;
        // each step below is a barrier across sets.
        let sets = set_roles(config);
        let concurrency = sets.len().max(1);

        stream::iter(
            sets.iter()
                .map(|(rs, role)| self.setup_replica_set(rs, *role)),
        )
        .buffer_unordered(concurrency)
        .try_collect::<Vec<_>>()
        .await?;
        self.transition(cluster, ProvisionState::RsInitiated);

        stream::iter(
            sets.iter()
                .filter_map(|(rs, _)| rs.primary_host())
                .map(|host| self.wait_for_primary(host, self.options.election_timeout)),
        )
        .buffer_unordered(concurrency)
        .try_collect::<Vec<_>>()
        .await?;
        self.transition(cluster, ProvisionState::PrimaryElected);

        if let TopologyConfig::Sharded(sharded) = config {
            let spec = self.mongos_spec(sharded, memory);
            let id = self.runtime.run_container(&spec).await?;
            cluster
                .containers
                .insert(sharded.mongos_host.clone(), id);
            self.wait_for_mongos(&sharded.mongos_host).await?;
        }

        let entry = entry_host(config)?;
        self.setup_authorization(entry).await?;
        self.transition(cluster, ProvisionState::AuthBootstrapped);

        if let TopologyConfig::Sharded(sharded) = config {
            self.add_shards(sharded).await?;
            self.transition(cluster, ProvisionState::ShardsAdded);
        }

        Ok(())
    }

    async fn create_mongod_containers(
        &self,
        config: &TopologyConfig,
        memory: Option<u64>,
        cluster: &mut Cluster,
    ) -> Result<()> {
        for (rs, role) in set_roles(config) {
            for member in &rs.members {
                let spec = self.mongod_spec(&member.host, &rs.id, role, memory);
                let id = self.runtime.run_container(&spec).await?;
                cluster.containers.insert(member.host.clone(), id);
            }
        }
        Ok(())
    }

    fn mongod_spec(
        &self,
        host: &str,
        set_id: &str,
        role: MongodRole,
        memory: Option<u64>,
    ) -> ContainerSpec {
        let mut spec = ContainerSpec::new(host, &self.options.image)
            .command(mongod_command(
                set_id,
                role,
                self.options.port,
                &self.options.tool.extra_mongod_args,
            ))
            .network(&self.options.network)
            .bind(
                BindMount::new(
                    self.options.keyfile_path.to_string_lossy(),
                    KEYFILE_CONTAINER_PATH,
                )
                .read_only(),
            )
            .cap("NET_ADMIN")
            .label("moray.set", set_id)
            .label("moray.role", role.name());

        if let Some(bytes) = memory {
            spec = spec.memory_bytes(bytes);
        }
        spec
    }

    fn mongos_spec(&self, sharded: &ShardedSpec, memory: Option<u64>) -> ContainerSpec {
        let mut spec = ContainerSpec::new(&sharded.mongos_host, &self.options.image)
            .command(mongos_command(&sharded.config_server, self.options.port))
            .network(&self.options.network)
            .bind(
                BindMount::new(
                    self.options.keyfile_path.to_string_lossy(),
                    KEYFILE_CONTAINER_PATH,
                )
                .read_only(),
            )
            .cap("NET_ADMIN")
            .label("moray.role", "mongos");

        if let Some(bytes) = memory {
            spec = spec.memory_bytes(bytes);
        }
        spec
    }

    /// Initiates a replica set through its first member.
    ///
    /// The first member's priority is elevated to [`PRIMARY_PRIORITY`]
    /// so it wins the election. "Already initialized" counts as success;
    /// transient startup races retry on the fixed interval; anything
    /// else is fatal.
    pub async fn setup_replica_set(&self, spec: &ReplicaSetSpec, role: MongodRole) -> Result<()> {
        let host = spec.primary_host().ok_or_else(|| {
            OrchestratorError::initiate_failed(&spec.id, "replica set has no members")
        })?;

        let command = initiate_document(spec, role);
        info!(set = %spec.id, host = %host, "Initiating replica set");

        let result = poll_until(
            PollConfig::new(self.options.poll_interval, self.options.initiate_timeout),
            &format!("replica set {} to initiate", spec.id),
            || {
                let fut = self.admin_eval(host, command.clone());
                let set = spec.id.clone();
                async move {
                    match fut.await {
                        Ok(_) => Ok(PollStatus::Ready(())),
                        Err(OrchestratorError::CommandFailed { output, .. }) => {
                            match initiate_disposition(&output) {
                                InitiateDisposition::AlreadyInitiated => {
                                    debug!(set = %set, "Replica set already initiated");
                                    Ok(PollStatus::Ready(()))
                                }
                                InitiateDisposition::Retry => Ok(PollStatus::Pending(brief(&output))),
                                InitiateDisposition::Fatal => {
                                    Err(OrchestratorError::initiate_failed(&set, brief(&output)))
                                }
                            }
                        }
                        Err(e) => Err(e),
                    }
                }
            },
        )
        .await;

        match result {
            Ok(()) => {
                info!(set = %spec.id, "Replica set initiated");
                Ok(())
            }
            Err(PollError::TimedOut { last_state, .. }) => Err(OrchestratorError::initiate_failed(
                &spec.id,
                format!("no successful initiate within timeout; last error: {last_state}"),
            )),
            Err(PollError::Fatal(e)) => Err(e),
        }
    }

    /// Polls `hello` on one host until it reports writable primary.
    ///
    /// Any driver or server error is fatal immediately; the timeout
    /// error surfaces the last observed hello state.
    pub async fn wait_for_primary(&self, host: &str, timeout: Duration) -> Result<HelloStatus> {
        let handle = MongoHandle::connect(&direct_connection_string(host, None)).await?;
        wait_for_primary_with(host, self.options.poll_interval, timeout, || handle.hello()).await
    }

    async fn wait_for_mongos(&self, host: &str) -> Result<HelloStatus> {
        let handle = MongoHandle::connect(&direct_connection_string(host, None)).await?;

        let result = poll_until(
            PollConfig::new(self.options.poll_interval, self.options.election_timeout),
            &format!("mongos {host} to accept connections"),
            || {
                let fut = handle.hello();
                async move {
                    match fut.await {
                        Ok(status) => Ok(PollStatus::Ready(status)),
                        // The router is still starting; keep knocking.
                        Err(e) if e.is_transport() => Ok(PollStatus::Pending(e.to_string())),
                        Err(e) => Err(e),
                    }
                }
            },
        )
        .await;

        match result {
            Ok(status) => {
                info!(host = %host, "mongos is up");
                Ok(status)
            }
            Err(PollError::TimedOut {
                condition,
                last_state,
            }) => Err(OrchestratorError::Timeout {
                condition,
                last_state,
            }),
            Err(PollError::Fatal(e)) => Err(e.into()),
        }
    }

    /// Creates the harness accounts through the given entry point (the
    /// replica-set primary, or the mongos on sharded clusters).
    ///
    /// The root user goes through the localhost exception inside the
    /// container; the internal and tool accounts follow over an
    /// authenticated driver connection. Once authorization is live a
    /// re-run fails loudly on the first step.
    pub async fn setup_authorization(&self, host: &str) -> Result<()> {
        let credentials = &self.options.credentials;
        info!(host = %host, "Bootstrapping authorization");

        self.admin_eval(
            host,
            create_user_document(&credentials.root, &[ServiceRole::new("root", "admin")]),
        )
        .await
        .map_err(|e| OrchestratorError::authorization_failed(host, e.to_string()))?;
        info!(host = %host, user = %credentials.root.username, "Created root user");

        let handle = MongoHandle::connect(&direct_connection_string(
            host,
            Some(&credentials.root),
        ))
        .await?;

        let accounts = [
            (&credentials.internal, internal_roles()),
            (&credentials.tool, self.options.tool.service_roles.clone()),
        ];

        for (account, roles) in accounts {
            handle
                .command("admin", create_user_document(account, &roles))
                .await
                .map_err(|e| OrchestratorError::authorization_failed(host, e.to_string()))?;
            info!(host = %host, user = %account.username, "Created user");
        }

        Ok(())
    }

    /// Registers every shard with the mongos.
    ///
    /// A brand-new cluster can reject the first `addShard` until the
    /// cluster-wide default write concern is set; that one failure is
    /// recovered by applying the default and retrying exactly once.
    pub async fn add_shards(&self, sharded: &ShardedSpec) -> Result<()> {
        let handle = MongoHandle::connect(&direct_connection_string(
            &sharded.mongos_host,
            Some(&self.options.credentials.root),
        ))
        .await?;

        for shard in &sharded.shards {
            let address = shard_address(shard);
            match handle.command("admin", doc! { "addShard": &address }).await {
                Ok(_) => {}
                Err(e) if needs_default_write_concern(&e) => {
                    warn!(
                        shard = %shard.id,
                        "Default write concern not yet set; applying and retrying once"
                    );
                    handle
                        .command("admin", set_default_rw_concern_document())
                        .await
                        .map_err(|err| {
                            OrchestratorError::add_shard_failed(&shard.id, err.to_string())
                        })?;
                    handle
                        .command("admin", doc! { "addShard": &address })
                        .await
                        .map_err(|err| {
                            OrchestratorError::add_shard_failed(&shard.id, err.to_string())
                        })?;
                }
                Err(e) => {
                    return Err(OrchestratorError::add_shard_failed(&shard.id, e.to_string()));
                }
            }
            info!(shard = %shard.id, address = %address, "Shard added");
        }

        Ok(())
    }

    /// Removes every container of the topology and the network.
    ///
    /// Idempotent: already-removed containers are skipped. With
    /// `cleanup_backups` the tool's in-flight operations are drained
    /// first (bounded wait; drain problems never block teardown).
    pub async fn destroy(&self, config: &TopologyConfig, options: DestroyOptions) -> Result<()> {
        info!(layout = %config.layout(), "Destroying topology");

        if options.cleanup_backups {
            self.drain_active_operations(config).await;
        }

        let mut failures = Vec::new();
        for host in config.all_hosts() {
            match self.runtime.remove_container(host).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(container = %host, "Container already removed");
                }
                Err(e) => {
                    error!(container = %host, error = %e, "Failed to remove container");
                    failures.push(format!("{host}: {e}"));
                }
            }
        }

        // The network may be shared with a co-resident cluster; removal
        // problems are not teardown failures.
        match self.runtime.remove_network(&self.options.network).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(network = %self.options.network, error = %e, "Network not removed"),
        }

        if failures.is_empty() {
            info!(layout = %config.layout(), "Topology destroyed");
            Ok(())
        } else {
            Err(OrchestratorError::teardown_failed(failures.join("; ")))
        }
    }

    async fn drain_active_operations(&self, config: &TopologyConfig) {
        let Some(ns) = self.options.tool.active_operation_namespace.clone() else {
            return;
        };

        info!(namespace = %ns, tool = %self.options.tool.name, "Draining in-flight operations");

        let uri = config.connection_string(&self.options.credentials, CredentialRole::Root);
        let handle = match MongoHandle::connect(&uri).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "Cannot reach cluster for drain; proceeding with teardown");
                return;
            }
        };

        let filter = self.options.tool.active_operation_filter.clone();
        let result = poll_until(
            PollConfig::new(self.options.poll_interval, self.options.drain_timeout),
            "in-flight operations to drain",
            || {
                let fut =
                    handle.count_documents(&ns.database, &ns.collection, filter.clone());
                async move {
                    match fut.await {
                        Ok(0) => Ok(PollStatus::Ready(())),
                        Ok(n) => Ok(PollStatus::Pending(format!("{n} operations in flight"))),
                        Err(e) => Err(e),
                    }
                }
            },
        )
        .await;

        match result {
            Ok(()) => info!("No operations in flight"),
            Err(PollError::TimedOut { last_state, .. }) => {
                warn!(last_state = %last_state, "Drain timed out; proceeding with teardown");
            }
            Err(PollError::Fatal(e)) => {
                warn!(error = %e, "Drain failed; proceeding with teardown");
            }
        }
    }

    /// Runs an admin command inside a container via `mongosh`.
    ///
    /// The command document is serialized by serde and the reply parsed
    /// back from EJSON, so nothing is ever spliced into shell text by
    /// hand. Reserved for the two bootstrap commands that cannot travel
    /// over an unauthenticated remote connection.
    pub(crate) async fn admin_eval(
        &self,
        host: &str,
        command: Document,
    ) -> Result<serde_json::Value> {
        let name = command
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(|| "<empty>".to_string());

        let payload = serde_json::to_string(&command)
            .map_err(|e| OrchestratorError::Serialization(e.to_string()))?;
        let eval = format!("EJSON.stringify(db.adminCommand({payload}))");

        let output = self
            .runtime
            .exec(host, &["mongosh", "--quiet", "--norc", "--eval", &eval])
            .await?;

        if !output.success() {
            return Err(OrchestratorError::command_failed(
                host,
                &name,
                output.exit_code,
                output.combined_output(),
            ));
        }

        let reply: serde_json::Value =
            serde_json::from_str(output.stdout.trim()).map_err(|_| {
                OrchestratorError::command_failed(host, &name, output.exit_code, output.combined_output())
            })?;

        if !command_reply_ok(&reply) {
            return Err(OrchestratorError::command_failed(
                host,
                &name,
                0,
                reply_error_text(&reply),
            ));
        }

        Ok(reply)
    }

    fn transition(&self, cluster: &mut Cluster, state: ProvisionState) {
        info!(state = %state, "Topology state");
        cluster.state = state;
    }
}

/// Polls a scripted or live `hello` probe until it reports writable
/// primary.
///
/// Separated from [`Provisioner::wait_for_primary`] so election behavior
/// is testable without a server: any probe error is fatal immediately,
/// and the timeout error carries the last observed state.
pub async fn wait_for_primary_with<F, Fut>(
    host: &str,
    interval: Duration,
    timeout: Duration,
    mut hello: F,
) -> Result<HelloStatus>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<HelloStatus, ClientError>>,
{
    debug!(host = %host, "Waiting for writable primary");

    let result = poll_until(
        PollConfig::new(interval, timeout),
        &format!("writable primary on {host}"),
        || {
            let fut = hello();
            async move {
                match fut.await {
                    Ok(status) if status.is_writable_primary => Ok(PollStatus::Ready(status)),
                    Ok(status) => Ok(PollStatus::Pending(status.summary())),
                    Err(e) => Err(e),
                }
            }
        },
    )
    .await;

    match result {
        Ok(status) => {
            info!(host = %host, "Writable primary observed");
            Ok(status)
        }
        Err(PollError::TimedOut { last_state, .. }) => Err(OrchestratorError::ElectionTimeout {
            host: host.to_string(),
            timeout,
            last_state,
        }),
        Err(PollError::Fatal(e)) => Err(e.into()),
    }
}

/// How a failed `replSetInitiate` should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InitiateDisposition {
    /// The set is already up; rerunning can never change the outcome.
    AlreadyInitiated,

    /// A startup race; retry on the fixed interval.
    Retry,

    /// Anything else.
    Fatal,
}

/// Narrow pattern match over the initiate error text.
pub(crate) fn initiate_disposition(output: &str) -> InitiateDisposition {
    if output.contains("already initialized") || output.contains("AlreadyInitialized") {
        return InitiateDisposition::AlreadyInitiated;
    }

    const TRANSIENT: &[&str] = &[
        "No host described in new configuration",
        "NodeNotFound",
        "Connection refused",
        "connection refused",
        "ECONNREFUSED",
        "resync in progress",
    ];

    if TRANSIENT.iter().any(|p| output.contains(p)) {
        InitiateDisposition::Retry
    } else {
        InitiateDisposition::Fatal
    }
}

/// True for the one recoverable `addShard` failure: the cluster-wide
/// default write concern has not been set yet.
pub(crate) fn needs_default_write_concern(err: &ClientError) -> bool {
    err.message_contains("default write concern")
}

/// Splits host memory evenly across the topology's containers.
///
/// Returns `None` (no limit) when the runtime does not report memory.
pub(crate) fn per_container_memory(host_memory: u64, containers: usize) -> Option<u64> {
    if host_memory == 0 || containers == 0 {
        None
    } else {
        Some(host_memory / containers as u64)
    }
}

fn set_roles(config: &TopologyConfig) -> Vec<(&ReplicaSetSpec, MongodRole)> {
    match config {
        TopologyConfig::ReplicaSet(rs) => vec![(rs, MongodRole::Replica)],
        TopologyConfig::Sharded(sharded) => {
            let mut sets = vec![(&sharded.config_server, MongodRole::ConfigServer)];
            sets.extend(sharded.shards.iter().map(|s| (s, MongodRole::Shard)));
            sets
        }
    }
}

fn entry_host(config: &TopologyConfig) -> Result<&str> {
    match config {
        TopologyConfig::ReplicaSet(rs) => rs.primary_host().ok_or_else(|| {
            OrchestratorError::UnsupportedTopology("replica set has no members".to_string())
        }),
        TopologyConfig::Sharded(sharded) => Ok(sharded.mongos_host.as_str()),
    }
}

pub(crate) fn mongod_command(
    set_id: &str,
    role: MongodRole,
    port: u16,
    extra: &[String],
) -> Vec<String> {
    let mut cmd = vec![
        "mongod".to_string(),
        "--replSet".to_string(),
        set_id.to_string(),
        "--port".to_string(),
        port.to_string(),
        "--bind_ip_all".to_string(),
        "--keyFile".to_string(),
        KEYFILE_CONTAINER_PATH.to_string(),
    ];

    match role {
        MongodRole::Shard => cmd.push("--shardsvr".to_string()),
        MongodRole::ConfigServer => cmd.push("--configsvr".to_string()),
        MongodRole::Replica => {}
    }

    cmd.extend(extra.iter().cloned());
    cmd
}

pub(crate) fn mongos_command(config_server: &ReplicaSetSpec, port: u16) -> Vec<String> {
    vec![
        "mongos".to_string(),
        "--port".to_string(),
        port.to_string(),
        "--bind_ip_all".to_string(),
        "--keyFile".to_string(),
        KEYFILE_CONTAINER_PATH.to_string(),
        "--configdb".to_string(),
        format!("{}/{}", config_server.id, config_server.seed_list()),
    ]
}

/// Builds one member entry of the `replSetInitiate` configuration.
///
/// The first member gets [`PRIMARY_PRIORITY`] instead of its declared
/// overrides (validation guarantees it declared none).
pub(crate) fn member_document(index: i32, member: &MemberSpec, elevate_primary: bool) -> Document {
    let mut doc = doc! {
        "_id": index,
        "host": host_with_port(&member.host),
    };

    if elevate_primary {
        doc.insert("priority", PRIMARY_PRIORITY);
    } else {
        if let Some(hidden) = member.hidden {
            doc.insert("hidden", hidden);
        }
        if let Some(priority) = member.priority {
            doc.insert("priority", priority);
        }
        if let Some(arbiter) = member.arbiter_only {
            doc.insert("arbiterOnly", arbiter);
        }
    }

    if let Some(delay) = member.secondary_delay_secs {
        doc.insert("secondaryDelaySecs", delay);
    }
    if let Some(votes) = member.votes {
        doc.insert("votes", votes);
    }
    if let Some(build) = member.build_indexes {
        doc.insert("buildIndexes", build);
    }
    if let Some(tags) = &member.tags {
        let tags: Document = tags
            .iter()
            .map(|(k, v)| (k.clone(), Bson::String(v.clone())))
            .collect();
        doc.insert("tags", tags);
    }

    doc
}

pub(crate) fn initiate_document(spec: &ReplicaSetSpec, role: MongodRole) -> Document {
    let members: Vec<Bson> = spec
        .members
        .iter()
        .enumerate()
        .map(|(i, m)| Bson::Document(member_document(i as i32, m, i == 0)))
        .collect();

    let mut config = doc! {
        "_id": &spec.id,
        "members": members,
    };
    if role == MongodRole::ConfigServer {
        config.insert("configsvr", true);
    }

    doc! { "replSetInitiate": config }
}

pub(crate) fn create_user_document(credentials: &Credentials, roles: &[ServiceRole]) -> Document {
    let roles: Vec<Bson> = roles
        .iter()
        .map(|r| Bson::Document(doc! { "role": &r.role, "db": &r.db }))
        .collect();

    doc! {
        "createUser": &credentials.username,
        "pwd": &credentials.password,
        "roles": roles,
    }
}

fn internal_roles() -> Vec<ServiceRole> {
    vec![
        ServiceRole::new("clusterAdmin", "admin"),
        ServiceRole::new("readWriteAnyDatabase", "admin"),
    ]
}

pub(crate) fn shard_address(shard: &ReplicaSetSpec) -> String {
    format!("{}/{}", shard.id, shard.seed_list())
}

pub(crate) fn set_default_rw_concern_document() -> Document {
    doc! {
        "setDefaultRWConcern": 1,
        "defaultReadConcern": { "level": "majority" },
        "defaultWriteConcern": { "w": "majority" },
    }
}

fn command_reply_ok(reply: &serde_json::Value) -> bool {
    match reply.get("ok") {
        Some(serde_json::Value::Number(n)) => n.as_f64() == Some(1.0),
        // Canonical EJSON wraps numbers
        Some(serde_json::Value::Object(wrapped)) => ["$numberDouble", "$numberInt", "$numberLong"]
            .iter()
            .any(|key| {
                matches!(
                    wrapped.get(*key),
                    Some(serde_json::Value::String(s))
                        if s.parse::<f64>().map(|v| v == 1.0).unwrap_or(false)
                )
            }),
        _ => false,
    }
}

fn reply_error_text(reply: &serde_json::Value) -> String {
    let code_name = reply.get("codeName").and_then(|v| v.as_str()).unwrap_or("");
    let errmsg = reply.get("errmsg").and_then(|v| v.as_str()).unwrap_or("");

    let text = format!("{code_name} {errmsg}");
    let text = text.trim();
    if text.is_empty() {
        reply.to_string()
    } else {
        text.to_string()
    }
}

/// First line of a command output, truncated for log/state strings.
fn brief(output: &str) -> String {
    let line = output.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut line = line.trim().to_string();
    if line.len() > 160 {
        line.truncate(160);
    }
    line
}
