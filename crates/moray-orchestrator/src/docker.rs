//! Docker implementation of the container runtime.
//!
//! Uses the Docker API directly via bollard. Containers are created on a
//! dedicated bridge network and named after their topology host, so every
//! member resolves every other member by host name.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, RestartContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, Result};
use crate::runtime::{ContainerRuntime, ContainerSpec, ExecOutput};

/// Label applied to every resource the harness creates.
const PROJECT_LABEL: &str = "moray.project";

/// Container runtime backed by the local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
    project: String,
}

impl DockerRuntime {
    /// Connects to the local Docker daemon and verifies the connection.
    pub async fn connect() -> Result<Self> {
        Self::connect_with_project("moray").await
    }

    /// Connects with a custom project label value.
    ///
    /// The label lets co-resident harness runs identify their own
    /// resources.
    pub async fn connect_with_project(project: impl Into<String>) -> Result<Self> {
        let project = project.into();
        let docker = Docker::connect_with_local_defaults()?;
        docker.ping().await?;

        info!(project = %project, "Connected to Docker daemon");

        Ok(Self { docker, project })
    }

    fn is_not_found(err: &bollard::errors::Error) -> bool {
        matches!(
            err,
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                ..
            }
        )
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_network(&self, name: &str) -> Result<String> {
        // Reuse an existing network with the same name; co-resident
        // clusters share one bridge.
        let filters: HashMap<String, Vec<String>> =
            [("name".to_string(), vec![name.to_string()])]
                .into_iter()
                .collect();

        let existing = self
            .docker
            .list_networks(Some(ListNetworksOptions { filters }))
            .await?;

        if let Some(network) = existing.iter().find(|n| n.name.as_deref() == Some(name)) {
            if let Some(id) = &network.id {
                info!(network = %name, id = %id, "Using existing network");
                return Ok(id.clone());
            }
        }

        let labels: HashMap<&str, &str> = [(PROJECT_LABEL, self.project.as_str())]
            .into_iter()
            .collect();

        let options = CreateNetworkOptions {
            name,
            driver: "bridge",
            labels,
            ..Default::default()
        };

        let response = self.docker.create_network(options).await?;
        let id = response.id.unwrap_or_default();
        info!(network = %name, id = %id, "Created network");
        Ok(id)
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        match self.docker.remove_network(name).await {
            Ok(()) => {
                info!(network = %name, "Removed network");
                Ok(())
            }
            Err(e) if Self::is_not_found(&e) => {
                Err(OrchestratorError::network_not_found(name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let mut labels: HashMap<String, String> = spec
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        labels.insert(PROJECT_LABEL.to_string(), self.project.clone());

        let host_config = bollard::service::HostConfig {
            network_mode: Some(spec.network.clone()),
            memory: spec.memory_bytes.map(|b| b as i64),
            binds: if spec.binds.is_empty() {
                None
            } else {
                Some(spec.binds.iter().map(|b| b.as_docker_bind()).collect())
            },
            cap_add: if spec.cap_add.is_empty() {
                None
            } else {
                Some(spec.cap_add.clone())
            },
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            hostname: Some(spec.name.clone()),
            env: Some(env),
            labels: Some(labels),
            cmd: if spec.command.is_empty() {
                None
            } else {
                Some(spec.command.clone())
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| OrchestratorError::container_creation_failed(&spec.name, e.to_string()))?;

        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await?;

        info!(
            container = %spec.name,
            id = %response.id,
            memory = ?spec.memory_bytes,
            "Started container"
        );

        Ok(response.id)
    }

    async fn restart_container(&self, name: &str) -> Result<()> {
        match self
            .docker
            .restart_container(name, Some(RestartContainerOptions { t: 10 }))
            .await
        {
            Ok(()) => {
                info!(container = %name, "Restarted container");
                Ok(())
            }
            Err(e) if Self::is_not_found(&e) => {
                Err(OrchestratorError::container_not_found(name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let stop_options = StopContainerOptions { t: 10 };
        if let Err(e) = self.docker.stop_container(name, Some(stop_options)).await {
            if Self::is_not_found(&e) {
                return Err(OrchestratorError::container_not_found(name));
            }
            // Already stopped is fine; removal below decides.
            debug!(container = %name, error = %e, "Stop before removal failed");
        }

        let remove_options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        match self
            .docker
            .remove_container(name, Some(remove_options))
            .await
        {
            Ok(()) => {
                info!(container = %name, "Removed container");
                Ok(())
            }
            Err(e) if Self::is_not_found(&e) => {
                Err(OrchestratorError::container_not_found(name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exec(&self, container: &str, cmd: &[&str]) -> Result<ExecOutput> {
        debug!(container = %container, cmd = ?cmd, "Executing command");

        let exec_options = CreateExecOptions {
            cmd: Some(cmd.iter().map(|s| s.to_string()).collect()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = match self.docker.create_exec(container, exec_options).await {
            Ok(exec) => exec,
            Err(e) if Self::is_not_found(&e) => {
                return Err(OrchestratorError::container_not_found(container));
            }
            Err(e) => return Err(e.into()),
        };

        let start_result = self.docker.start_exec(&exec.id, None).await?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(result) = output.next().await {
                match result {
                    Ok(bollard::container::LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(bollard::container::LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(OrchestratorError::command_failed(
                            container,
                            cmd.first().copied().unwrap_or(""),
                            -1,
                            e.to_string(),
                        ));
                    }
                }
            }
        }

        let exec_inspect = self.docker.inspect_exec(&exec.id).await?;
        let exit_code = exec_inspect.exit_code.unwrap_or(-1) as i32;

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn host_memory_bytes(&self) -> Result<u64> {
        let info = self.docker.info().await?;
        let mem = info.mem_total.unwrap_or_default();
        if mem <= 0 {
            warn!("Docker daemon did not report host memory; skipping container memory limits");
            return Ok(0);
        }
        Ok(mem as u64)
    }
}
