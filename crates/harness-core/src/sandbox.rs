//! Sandbox Cell (spec §4.F): lifecycle of one target-environment container.

use std::path::Path;

use bollard::container::{Config, CreateContainerOptions};
use bollard::network::ConnectNetworkOptions;
use bollard::service::Mount;
use rand::RngCore;
use tracing::info;

use crate::catalog::Instance;
use crate::config::HarnessConfig;
use crate::docker::{self, NETWORK_INFRA, NETWORK_INTERNET};
use crate::error::{HarnessError, Result};

/// A running target-environment container. Dropping this value does not
/// stop the container — call [`SandboxCell::stop`] explicitly from the
/// owning scope's cleanup path.
pub struct SandboxCell {
    container_id: String,
    /// `root:<password>@<ip>`, handed to the agent cell as `--env-ssh`.
    pub connection_string: String,
}

fn random_password() -> String {
    let mut bytes = [0u8; 10];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl SandboxCell {
    /// Start a sandbox container for `instance`, mounting `pcap_dir`
    /// read-write at `/mnt/pcap` and the configured sshbox scripts
    /// directory read-only at `/mnt/sshbox`.
    pub async fn start(
        instance: &Instance,
        pcap_dir: &Path,
        cfg: &HarnessConfig,
        container_name: &str,
    ) -> Result<Self> {
        let docker = docker::client()?;
        let password = random_password();

        let mut host_config = docker::resource_envelope(&cfg.rootfs_device);
        host_config.mounts = Some(vec![
            Mount {
                target: Some("/mnt/sshbox".to_string()),
                source: Some(cfg.sshbox_script_path.to_string_lossy().to_string()),
                typ: Some(bollard::service::MountTypeEnum::BIND),
                read_only: Some(true),
                ..Default::default()
            },
            Mount {
                target: Some("/mnt/pcap".to_string()),
                source: Some(pcap_dir.to_string_lossy().to_string()),
                typ: Some(bollard::service::MountTypeEnum::BIND),
                read_only: Some(false),
                ..Default::default()
            },
        ]);

        let config = Config {
            image: Some(instance.sandbox_image.clone()),
            entrypoint: Some(vec!["/mnt/sshbox/start.sh".to_string()]),
            cmd: Some(vec![password.clone()]),
            env: Some(docker::fixed_environment()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = docker
            .create_container(
                Some(CreateContainerOptions {
                    name: container_name,
                    platform: None,
                }),
                config,
            )
            .await?;
        let container_id = created.id;

        docker
            .connect_network(
                NETWORK_INFRA,
                ConnectNetworkOptions {
                    container: container_id.clone(),
                    ..Default::default()
                },
            )
            .await?;

        docker.start_container::<String>(&container_id, None).await?;

        docker
            .connect_network(
                NETWORK_INTERNET,
                ConnectNetworkOptions {
                    container: container_id.clone(),
                    ..Default::default()
                },
            )
            .await?;

        let inspect = docker.inspect_container(&container_id, None).await?;
        let ip = inspect
            .network_settings
            .as_ref()
            .and_then(|settings| settings.networks.as_ref())
            .and_then(|networks| networks.get(NETWORK_INFRA))
            .and_then(|net| net.ip_address.clone())
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| {
                HarnessError::Docker(format!(
                    "sandbox container {container_id} has no IP on {NETWORK_INFRA}"
                ))
            })?;

        info!(container_id, %ip, "sandbox cell started");

        Ok(Self {
            container_id,
            connection_string: format!("root:{password}@{ip}"),
        })
    }

    /// Stop and remove the sandbox container via the two-try protocol.
    pub async fn stop(self) {
        docker::stop_and_remove(&self.container_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::random_password;

    #[test]
    fn random_password_is_twenty_hex_chars() {
        let password = random_password();
        assert_eq!(password.len(), 20);
        assert!(password.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn random_password_is_not_constant() {
        let a = random_password();
        let b = random_password();
        assert_ne!(a, b);
    }
}
