//! Agent Cell (spec §4.G): lifecycle of one candidate-agent container.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bollard::container::{Config, CreateContainerOptions, LogsOptions, WaitContainerOptions};
use bollard::service::Mount;
use chrono::Utc;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::docker;
use crate::error::{HarnessError, Result};

/// Arguments the harness wires onto the agent container's command line
/// (spec §6 "Agent CLI").
pub struct AgentCellArgs<'a> {
    pub instance_path: &'a Path,
    pub memory_path: &'a Path,
    pub llm_base_url: &'a str,
    pub llm_api_key: &'a str,
    pub env_ssh: &'a str,
    pub image: &'a str,
    pub log_path: &'a Path,
    pub run_name: &'a str,
    pub ident: &'a str,
    pub verbose: u8,
    /// Block device the resource envelope's IO throttling applies to (spec §6).
    pub rootfs_device: &'a Path,
}

/// Outcome of waiting on the agent container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOutcome {
    /// Container exited (any status) before the timeout elapsed.
    Exited { status_code: i64 },
    /// The wait timed out; the container may still be running.
    TimedOut,
}

/// A running agent container plus its detached log-streaming task.
pub struct AgentCell {
    container_id: String,
    log_task: JoinHandle<()>,
}

impl AgentCell {
    /// Start the agent container and, one second later, attach a log
    /// reader that writes timestamped lines to `args.log_path` and mirrors
    /// them to stdout when verbose.
    pub async fn start(args: AgentCellArgs<'_>) -> Result<Self> {
        let docker = docker::client()?;

        let mut env = docker::fixed_environment();
        env.push(format!("LLM_BASE_URL={}", args.llm_base_url));
        env.push(format!("LLM_API_KEY={}", args.llm_api_key));
        env.push(format!("ENV_SSH={}", args.env_ssh));

        let mut host_config = docker::resource_envelope(args.rootfs_device);
        host_config.mounts = Some(vec![
            Mount {
                target: Some("/mnt/instance".to_string()),
                source: Some(args.instance_path.to_string_lossy().to_string()),
                typ: Some(bollard::service::MountTypeEnum::BIND),
                read_only: Some(false),
                ..Default::default()
            },
            Mount {
                target: Some("/mnt/memory".to_string()),
                source: Some(args.memory_path.to_string_lossy().to_string()),
                typ: Some(bollard::service::MountTypeEnum::BIND),
                read_only: Some(false),
                ..Default::default()
            },
        ]);
        host_config.network_mode = Some(docker::NETWORK_INFRA.to_string());

        let config = Config {
            image: Some(args.image.to_string()),
            cmd: Some(vec![
                "--instance-path".to_string(),
                "/mnt/instance".to_string(),
                "--memory-path".to_string(),
                "/mnt/memory".to_string(),
                "--llm-base-url".to_string(),
                args.llm_base_url.to_string(),
                "--llm-api-key".to_string(),
                args.llm_api_key.to_string(),
                "--env-ssh".to_string(),
                args.env_ssh.to_string(),
            ]),
            env: Some(env),
            host_config: Some(host_config),
            ..Default::default()
        };

        let name = format!("agent-{}-{}", args.run_name, args.ident);
        let created = docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.as_str(),
                    platform: None,
                }),
                config,
            )
            .await?;
        let container_id = created.id;

        docker.start_container::<String>(&container_id, None).await?;

        // Attaching before the container has actually started output can
        // drop the first lines; this delay works around that race (spec
        // §9 "Log stream startup race").
        tokio::time::sleep(Duration::from_secs(1)).await;

        let log_task = spawn_log_reader(
            container_id.clone(),
            args.log_path.to_path_buf(),
            args.run_name.to_string(),
            args.ident.to_string(),
            args.verbose,
        );

        Ok(Self {
            container_id,
            log_task,
        })
    }

    /// Wait for the container to exit, up to `timeout`. On timeout, the
    /// container is left running for the caller's cleanup to stop.
    pub async fn wait(&self, timeout: Duration) -> Result<AgentOutcome> {
        let docker = docker::client()?;
        let mut stream = docker.wait_container(
            &self.container_id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );

        match tokio::time::timeout(timeout, stream.next()).await {
            Ok(Some(Ok(result))) => Ok(AgentOutcome::Exited {
                status_code: result.status_code,
            }),
            Ok(Some(Err(e))) => Err(HarnessError::Docker(format!("agent wait failed: {e}"))),
            Ok(None) => Err(HarnessError::Docker(
                "agent wait stream closed unexpectedly".into(),
            )),
            Err(_) => Ok(AgentOutcome::TimedOut),
        }
    }

    /// Stop and remove the agent container, then join the log reader.
    pub async fn stop(self) {
        docker::stop_and_remove(&self.container_id).await;
        if let Err(e) = self.log_task.await {
            warn!(error = %e, "agent log reader task panicked");
        }
    }
}

fn spawn_log_reader(
    container_id: String,
    log_path: PathBuf,
    run_name: String,
    ident: String,
    verbose: u8,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let docker = match docker::client() {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "log reader could not obtain docker client");
                return;
            }
        };

        let mut file = match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
        {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, path = %log_path.display(), "failed to open agent log file");
                return;
            }
        };

        let mut stream = docker.logs::<String>(
            &container_id,
            Some(LogsOptions {
                follow: true,
                stdout: true,
                stderr: true,
                timestamps: true,
                ..Default::default()
            }),
        );

        while let Some(chunk) = stream.next().await {
            let line = match chunk {
                Ok(output) => output.to_string(),
                Err(_) => break,
            };
            let _ = file.write_all(line.as_bytes());

            if verbose >= 2 {
                let mirrored = strip_timestamp_prefix(&line);
                let ts = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
                println!("{ts} | {run_name} {ident}: {mirrored}");
            }
        }
    })
}

/// Docker's `timestamps: true` prefixes every line with an RFC3339
/// timestamp followed by a space; strip it before mirroring to stdout
/// (the harness applies its own timestamp there).
fn strip_timestamp_prefix(line: &str) -> &str {
    line.split_once(' ').map(|(_, rest)| rest).unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_docker_timestamp_prefix() {
        let line = "2026-07-26T10:00:00.123456789Z hello world\n";
        assert_eq!(strip_timestamp_prefix(line), "hello world\n");
    }

    #[test]
    fn strip_timestamp_prefix_on_line_without_space_is_unchanged() {
        assert_eq!(strip_timestamp_prefix("noSpace"), "noSpace");
    }
}
