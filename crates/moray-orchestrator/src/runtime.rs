//! Container runtime trait and specifications.
//!
//! The provisioner talks to the container runtime through the
//! [`ContainerRuntime`] trait. Production uses the Docker implementation
//! in [`docker`](crate::docker); tests substitute an in-memory fake.
//! Containers are keyed by host name throughout: the container name, the
//! container hostname, and the DNS name on the cluster network are all
//! the same string.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Control surface of a container runtime.
///
/// Implementations must be thread-safe (`Send + Sync`): independent
/// replica sets are brought up concurrently.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates the cluster network, or reuses an existing one with the
    /// same name. Returns the network id.
    async fn create_network(&self, name: &str) -> Result<String>;

    /// Removes the cluster network.
    ///
    /// Returns [`OrchestratorError::NetworkNotFound`] when it does not
    /// exist; teardown callers swallow that.
    ///
    /// [`OrchestratorError::NetworkNotFound`]: crate::error::OrchestratorError::NetworkNotFound
    async fn remove_network(&self, name: &str) -> Result<()>;

    /// Creates and starts a container. Returns the container id.
    async fn run_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Restarts a container by name.
    async fn restart_container(&self, name: &str) -> Result<()>;

    /// Stops and force-removes a container by name.
    ///
    /// Returns [`OrchestratorError::ContainerNotFound`] when it does not
    /// exist; teardown callers swallow that so destroy stays idempotent.
    ///
    /// [`OrchestratorError::ContainerNotFound`]: crate::error::OrchestratorError::ContainerNotFound
    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Executes a command inside a running container.
    async fn exec(&self, container: &str, cmd: &[&str]) -> Result<ExecOutput>;

    /// Total memory of the host the containers run on, in bytes.
    ///
    /// Returns 0 when the runtime does not report it; callers then skip
    /// per-container memory limits.
    async fn host_memory_bytes(&self) -> Result<u64>;
}

/// Specification for one container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name; also the hostname and DNS alias on the network.
    pub name: String,

    /// Image reference.
    pub image: String,

    /// Command to run (mongod or mongos with full arguments).
    pub command: Vec<String>,

    /// Name of the network to attach to.
    pub network: String,

    /// Environment variables.
    pub env: BTreeMap<String, String>,

    /// Memory limit in bytes, if any.
    pub memory_bytes: Option<u64>,

    /// Bind mounts.
    pub binds: Vec<BindMount>,

    /// Linux capabilities to add (fault injection needs `NET_ADMIN`).
    pub cap_add: Vec<String>,

    /// Container labels.
    pub labels: BTreeMap<String, String>,
}

impl ContainerSpec {
    /// Creates a spec with the given name and image.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: Vec::new(),
            network: String::new(),
            env: BTreeMap::new(),
            memory_bytes: None,
            binds: Vec::new(),
            cap_add: Vec::new(),
            labels: BTreeMap::new(),
        }
    }

    /// Sets the command.
    pub fn command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Sets the network.
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Adds an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the memory limit.
    pub fn memory_bytes(mut self, bytes: u64) -> Self {
        self.memory_bytes = Some(bytes);
        self
    }

    /// Adds a bind mount.
    pub fn bind(mut self, mount: BindMount) -> Self {
        self.binds.push(mount);
        self
    }

    /// Adds a Linux capability.
    pub fn cap(mut self, capability: impl Into<String>) -> Self {
        self.cap_add.push(capability.into());
        self
    }

    /// Adds a label.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A host-path bind mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindMount {
    /// Source path on the host.
    pub source: String,

    /// Target path in the container.
    pub target: String,

    /// Whether the mount is read-only.
    pub read_only: bool,
}

impl BindMount {
    /// Creates a read-write bind mount.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    /// Marks the mount read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Renders the Docker bind string (`src:dst[:ro]`).
    pub fn as_docker_bind(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.source, self.target)
        } else {
            format!("{}:{}", self.source, self.target)
        }
    }
}

/// Output from executing a command in a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: String,

    /// Standard error from the command.
    pub stderr: String,

    /// Exit code of the command.
    pub exit_code: i32,
}

impl ExecOutput {
    /// Creates a new exec output.
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined stdout and stderr.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory runtime fake shared by orchestrator tests.

    use std::collections::{BTreeSet, VecDeque};
    use std::sync::Mutex;

    use super::*;
    use crate::error::OrchestratorError;

    /// Scripted in-memory [`ContainerRuntime`].
    ///
    /// Records every call; `exec` pops scripted outputs and falls back
    /// to a successful `{"ok": 1}` reply.
    #[derive(Default)]
    pub(crate) struct MockRuntime {
        /// Specs passed to `run_container`, in order.
        pub runs: Mutex<Vec<ContainerSpec>>,
        /// Containers currently "running".
        pub containers: Mutex<BTreeSet<String>>,
        /// Every exec invocation as (container, argv).
        pub exec_log: Mutex<Vec<(String, Vec<String>)>>,
        /// Scripted exec outputs, consumed front-to-back.
        pub exec_outputs: Mutex<VecDeque<ExecOutput>>,
        /// Containers whose exec calls fail with `ContainerNotFound`.
        pub broken_containers: Mutex<BTreeSet<String>>,
        /// Reported host memory.
        pub host_memory: u64,
        /// Restart invocations.
        pub restarts: Mutex<Vec<String>>,
    }

    impl MockRuntime {
        pub(crate) fn with_memory(host_memory: u64) -> Self {
            Self {
                host_memory,
                ..Self::default()
            }
        }

        pub(crate) fn with_containers<'a>(hosts: impl IntoIterator<Item = &'a str>) -> Self {
            let runtime = Self::default();
            runtime
                .containers
                .lock()
                .unwrap()
                .extend(hosts.into_iter().map(str::to_string));
            runtime
        }

        pub(crate) fn script_exec(&self, output: ExecOutput) {
            self.exec_outputs.lock().unwrap().push_back(output);
        }
    }

    #[async_trait]
    impl ContainerRuntime for MockRuntime {
        async fn create_network(&self, _name: &str) -> Result<String> {
            Ok("net-1".to_string())
        }

        async fn remove_network(&self, name: &str) -> Result<()> {
            let _ = name;
            Ok(())
        }

        async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
            self.runs.lock().unwrap().push(spec.clone());
            self.containers.lock().unwrap().insert(spec.name.clone());
            Ok(format!("cid-{}", spec.name))
        }

        async fn restart_container(&self, name: &str) -> Result<()> {
            if !self.containers.lock().unwrap().contains(name) {
                return Err(OrchestratorError::container_not_found(name));
            }
            self.restarts.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn remove_container(&self, name: &str) -> Result<()> {
            if self.containers.lock().unwrap().remove(name) {
                Ok(())
            } else {
                Err(OrchestratorError::container_not_found(name))
            }
        }

        async fn exec(&self, container: &str, cmd: &[&str]) -> Result<ExecOutput> {
            if self.broken_containers.lock().unwrap().contains(container) {
                return Err(OrchestratorError::container_not_found(container));
            }
            self.exec_log.lock().unwrap().push((
                container.to_string(),
                cmd.iter().map(|s| s.to_string()).collect(),
            ));
            Ok(self
                .exec_outputs
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ExecOutput::new("{\"ok\": 1}", "", 0)))
        }

        async fn host_memory_bytes(&self) -> Result<u64> {
            Ok(self.host_memory)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_spec_builder() {
        let spec = ContainerSpec::new("rs01", "mongo:7.0")
            .command(vec!["mongod".to_string(), "--replSet".to_string(), "rs0".to_string()])
            .network("moray-net")
            .env("TZ", "UTC")
            .memory_bytes(512 * 1024 * 1024)
            .bind(BindMount::new("/tmp/keyfile", "/etc/moray/keyfile").read_only())
            .cap("NET_ADMIN")
            .label("moray.set", "rs0");

        assert_eq!(spec.name, "rs01");
        assert_eq!(spec.command[0], "mongod");
        assert_eq!(spec.memory_bytes, Some(512 * 1024 * 1024));
        assert_eq!(spec.binds[0].as_docker_bind(), "/tmp/keyfile:/etc/moray/keyfile:ro");
        assert_eq!(spec.cap_add, vec!["NET_ADMIN".to_string()]);
    }

    #[test]
    fn test_bind_mount_render() {
        assert_eq!(
            BindMount::new("/a", "/b").as_docker_bind(),
            "/a:/b"
        );
        assert_eq!(
            BindMount::new("/a", "/b").read_only().as_docker_bind(),
            "/a:/b:ro"
        );
    }

    #[test]
    fn test_exec_output() {
        let output = ExecOutput::new("hello", "", 0);
        assert!(output.success());
        assert_eq!(output.combined_output(), "hello");

        let output = ExecOutput::new("out", "err", 1);
        assert!(!output.success());
        assert_eq!(output.combined_output(), "out\nerr");
    }
}
