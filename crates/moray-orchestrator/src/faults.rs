//! Fault injection: first-class perturbations for resilience testing.
//!
//! Each operation deliberately disturbs topology state and restores the
//! perturbation on every exit path: a restarted primary is waited on
//! until the set is writable again, and a netem packet-loss rule is
//! removed from every host it was applied to, whether the hold completed
//! or the apply failed halfway.
//!
//! The shared stop flag is honored only by the long-running
//! interruption hold; the core polling helpers have no cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use mongodb::bson::doc;
use moray_core::client::MongoHandle;
use moray_topology::{direct_connection_string, ReplicaSetSpec};
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, Result};
use crate::provision::Provisioner;
use crate::runtime::ContainerRuntime;

/// How long a stepped-down primary refuses to stand for election.
const STEP_DOWN_SECS: i32 = 60;

/// Network interface the interruption shapes inside each container.
const INTERFACE: &str = "eth0";

impl<R: ContainerRuntime> Provisioner<R> {
    /// Forces the current primary of a replica set to step down.
    ///
    /// The server drops client connections while stepping down, so a
    /// transport error from the command itself is the expected outcome
    /// and is not propagated.
    pub async fn step_down_primary(&self, spec: &ReplicaSetSpec) -> Result<()> {
        let host = self.current_primary(spec).await?;
        info!(set = %spec.id, host = %host, "Stepping down primary");

        let handle = MongoHandle::connect(&direct_connection_string(
            &host,
            Some(&self.options().credentials.root),
        ))
        .await?;

        match handle
            .command("admin", doc! { "replSetStepDown": STEP_DOWN_SECS })
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_transport() => {
                debug!(host = %host, "stepDown dropped the connection");
            }
            Err(e) => return Err(e.into()),
        }

        info!(set = %spec.id, host = %host, "Primary stepped down");
        Ok(())
    }

    /// Restarts the current primary's container and waits for the set to
    /// have a writable primary again before returning.
    pub async fn restart_primary(&self, spec: &ReplicaSetSpec) -> Result<()> {
        let host = self.current_primary(spec).await?;
        info!(set = %spec.id, host = %host, "Restarting primary");

        self.runtime().restart_container(&host).await?;
        self.wait_for_primary(&host, self.options().election_timeout)
            .await?;

        info!(set = %spec.id, host = %host, "Primary restarted and writable");
        Ok(())
    }

    /// Injects packet loss on the given hosts for `duration`.
    ///
    /// `loss_percent` of 100 is a full interruption. The hold honors the
    /// optional shared `stop` flag; the netem rule is removed from every
    /// host it was applied to on all exit paths.
    pub async fn network_interruption(
        &self,
        hosts: &[&str],
        duration: Duration,
        loss_percent: u8,
        stop: Option<&AtomicBool>,
    ) -> Result<()> {
        let apply = netem_apply_command(loss_percent);
        let apply_argv: Vec<&str> = apply.iter().map(String::as_str).collect();

        let mut applied: Vec<&str> = Vec::new();
        let mut failure = None;

        for &host in hosts {
            match self.runtime().exec(host, &apply_argv).await {
                Ok(output) if output.success() => applied.push(host),
                Ok(output) => {
                    failure = Some(OrchestratorError::command_failed(
                        host,
                        "tc",
                        output.exit_code,
                        output.combined_output(),
                    ));
                    break;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if failure.is_none() {
            info!(
                hosts = ?hosts,
                loss = loss_percent,
                duration = ?duration,
                "Network interruption active"
            );
            self.hold_interruption(duration, stop).await;
        }

        // Restore on every exit path, including a failed apply.
        let remove = netem_remove_command();
        let remove_argv: Vec<&str> = remove.iter().map(String::as_str).collect();
        for host in &applied {
            match self.runtime().exec(host, &remove_argv).await {
                Ok(output) if output.success() => {
                    debug!(host = %host, "Cleared netem qdisc");
                }
                Ok(output) => warn!(
                    host = %host,
                    output = %output.combined_output(),
                    "Failed to clear netem qdisc"
                ),
                Err(e) => warn!(host = %host, error = %e, "Failed to clear netem qdisc"),
            }
        }

        match failure {
            Some(e) => Err(e),
            None => {
                info!(hosts = ?hosts, "Network interruption ended");
                Ok(())
            }
        }
    }

    async fn hold_interruption(&self, duration: Duration, stop: Option<&AtomicBool>) {
        let deadline = Instant::now() + duration;
        loop {
            if stop.map(|s| s.load(Ordering::Relaxed)).unwrap_or(false) {
                info!("Network interruption stopped early");
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let remaining = deadline - now;
            tokio::time::sleep(remaining.min(self.options().poll_interval)).await;
        }
    }

    /// Resolves the replica set's current primary host via `hello`,
    /// falling back to the first member when no primary is reported.
    async fn current_primary(&self, spec: &ReplicaSetSpec) -> Result<String> {
        let handle = MongoHandle::connect(
            &spec.connection_string(Some(&self.options().credentials.root)),
        )
        .await?;

        let status = handle.hello().await?;
        let host = match status.primary {
            Some(primary) => strip_port(&primary).to_string(),
            None => spec
                .primary_host()
                .ok_or_else(|| {
                    OrchestratorError::UnsupportedTopology(
                        "replica set has no members".to_string(),
                    )
                })?
                .to_string(),
        };

        Ok(host)
    }
}

pub(crate) fn netem_apply_command(loss_percent: u8) -> Vec<String> {
    vec![
        "tc".to_string(),
        "qdisc".to_string(),
        "add".to_string(),
        "dev".to_string(),
        INTERFACE.to_string(),
        "root".to_string(),
        "netem".to_string(),
        "loss".to_string(),
        format!("{}%", loss_percent.min(100)),
    ]
}

pub(crate) fn netem_remove_command() -> Vec<String> {
    vec![
        "tc".to_string(),
        "qdisc".to_string(),
        "del".to_string(),
        "dev".to_string(),
        INTERFACE.to_string(),
        "root".to_string(),
        "netem".to_string(),
    ]
}

fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::ProvisionOptions;
    use crate::runtime::testing::MockRuntime;
    use crate::runtime::ExecOutput;

    fn provisioner(runtime: MockRuntime) -> Provisioner<MockRuntime> {
        let options = ProvisionOptions {
            poll_interval: Duration::from_millis(1),
            ..ProvisionOptions::default()
        };
        Provisioner::new(runtime, options)
    }

    #[test]
    fn test_netem_commands() {
        assert_eq!(
            netem_apply_command(35).join(" "),
            "tc qdisc add dev eth0 root netem loss 35%"
        );
        assert_eq!(
            netem_apply_command(255).join(" "),
            "tc qdisc add dev eth0 root netem loss 100%"
        );
        assert_eq!(
            netem_remove_command().join(" "),
            "tc qdisc del dev eth0 root netem"
        );
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("rs01:27017"), "rs01");
        assert_eq!(strip_port("rs01"), "rs01");
    }

    #[tokio::test]
    async fn test_interruption_applies_and_restores() {
        let runtime = MockRuntime::with_containers(["a", "b"]);
        let provisioner = provisioner(runtime);

        provisioner
            .network_interruption(&["a", "b"], Duration::from_millis(5), 100, None)
            .await
            .unwrap();

        let log = provisioner.runtime().exec_log.lock().unwrap();
        let calls: Vec<(&str, &str)> = log
            .iter()
            .map(|(host, argv)| (host.as_str(), argv[2].as_str()))
            .collect();

        // Loss applied to both hosts, then removed from both.
        assert_eq!(
            calls,
            vec![("a", "add"), ("b", "add"), ("a", "del"), ("b", "del")]
        );
    }

    #[tokio::test]
    async fn test_interruption_restores_after_failed_apply() {
        let runtime = MockRuntime::with_containers(["a", "b"]);
        // First apply succeeds, second fails.
        runtime.script_exec(ExecOutput::new("", "", 0));
        runtime.script_exec(ExecOutput::new("", "RTNETLINK answers: not permitted", 2));
        let provisioner = provisioner(runtime);

        let err = provisioner
            .network_interruption(&["a", "b"], Duration::from_millis(5), 50, None)
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::CommandFailed { .. }));

        let log = provisioner.runtime().exec_log.lock().unwrap();
        let calls: Vec<(&str, &str)> = log
            .iter()
            .map(|(host, argv)| (host.as_str(), argv[2].as_str()))
            .collect();

        // The rule applied to "a" is removed even though "b" failed.
        assert_eq!(calls, vec![("a", "add"), ("b", "add"), ("a", "del")]);
    }

    #[tokio::test]
    async fn test_interruption_honors_stop_flag() {
        let runtime = MockRuntime::with_containers(["a"]);
        let provisioner = provisioner(runtime);

        let stop = AtomicBool::new(true);
        let started = Instant::now();
        provisioner
            .network_interruption(&["a"], Duration::from_secs(3600), 100, Some(&stop))
            .await
            .unwrap();

        // A pre-set stop flag ends the hold on its first check.
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
