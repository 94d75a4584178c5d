//! Shared Docker Engine API plumbing: a process-wide connection, the fixed
//! resource envelope (spec §6), and the two-try stop/remove protocol that
//! every container lifecycle (Sandbox Cell, Agent Cell, Preflight) relies on.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use bollard::container::RemoveContainerOptions;
use bollard::service::HostConfig;
use bollard::Docker;
use tracing::warn;

use crate::error::{HarnessError, Result};

/// Internal network reachable by the agent cell, the sandbox cell, and the
/// model proxy.
pub const NETWORK_INFRA: &str = "infra";
/// Outbound-only network attached to the sandbox cell for internet egress.
pub const NETWORK_INTERNET: &str = "internet";

static DOCKER: OnceLock<Docker> = OnceLock::new();

/// Return the process-wide Docker connection, establishing it on first use.
pub fn client() -> Result<&'static Docker> {
    if let Some(docker) = DOCKER.get() {
        return Ok(docker);
    }
    let docker = Docker::connect_with_local_defaults()
        .map_err(|e| HarnessError::Docker(format!("failed to connect to docker: {e}")))?;
    Ok(DOCKER.get_or_init(|| docker))
}

/// Build the fixed resource envelope applied to every container (spec §6):
/// 6 CPU cores, 12 GiB memory + 12 GiB swap, 32768 pids, blkio weight 200,
/// 30 MiB/s + 2000 IOPS read/write throttling on `rootfs_device`, DNS
/// `223.5.5.5`, and `TZ=Asia/Shanghai`.
pub fn resource_envelope(rootfs_device: &Path) -> HostConfig {
    use bollard::service::ThrottleDevice;

    let device_path = rootfs_device.to_string_lossy().to_string();
    let bps_rate = 30 * 1024 * 1024;
    let iops_rate = 2000;
    let throttle = |rate: i64| {
        vec![ThrottleDevice {
            path: Some(device_path.clone()),
            rate: Some(rate),
        }]
    };

    HostConfig {
        cpu_period: Some(100_000),
        cpu_quota: Some(600_000),
        memory: Some(12 * 1024 * 1024 * 1024),
        memory_swap: Some(12 * 1024 * 1024 * 1024),
        pids_limit: Some(32_768),
        blkio_weight: Some(200),
        blkio_device_read_bps: Some(throttle(bps_rate)),
        blkio_device_write_bps: Some(throttle(bps_rate)),
        blkio_device_read_iops: Some(throttle(iops_rate)),
        blkio_device_write_iops: Some(throttle(iops_rate)),
        dns: Some(vec!["223.5.5.5".to_string()]),
        ..Default::default()
    }
}

/// The fixed environment applied to every container.
pub fn fixed_environment() -> Vec<String> {
    vec!["TZ=Asia/Shanghai".to_string()]
}

/// Stop then remove a container, per the harness-wide two-try protocol
/// (spec §3 invariants, §4.F/§4.G): stop with a 3-second grace, force
/// remove; on failure, force-remove again; on further failure, log and
/// continue. Never raises.
pub async fn stop_and_remove(container_id: &str) {
    let docker = match client() {
        Ok(d) => d,
        Err(e) => {
            warn!(container_id, error = %e, "no docker connection available for cleanup");
            return;
        }
    };

    let stop_result = docker
        .stop_container(
            container_id,
            Some(bollard::container::StopContainerOptions { t: 3 }),
        )
        .await;
    if let Err(e) = stop_result {
        warn!(container_id, error = %e, "stop failed, proceeding to force-remove");
    }

    let remove_opts = || {
        Some(RemoveContainerOptions {
            force: true,
            ..Default::default()
        })
    };

    if let Err(e) = docker.remove_container(container_id, remove_opts()).await {
        warn!(container_id, error = %e, "first remove failed, retrying once");
        tokio::time::sleep(Duration::from_millis(250)).await;
        if let Err(e2) = docker.remove_container(container_id, remove_opts()).await {
            warn!(container_id, error = %e2, "second remove failed, giving up (no orphan guarantee broken: container is left for manual cleanup)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_envelope_matches_fixed_values() {
        let envelope = resource_envelope(Path::new("/dev/sda"));
        assert_eq!(envelope.cpu_period, Some(100_000));
        assert_eq!(envelope.cpu_quota, Some(600_000));
        assert_eq!(envelope.memory, Some(12 * 1024 * 1024 * 1024));
        assert_eq!(envelope.pids_limit, Some(32_768));
        assert_eq!(envelope.blkio_weight, Some(200));
        assert_eq!(envelope.dns, Some(vec!["223.5.5.5".to_string()]));
    }

    #[test]
    fn fixed_environment_sets_timezone() {
        assert_eq!(fixed_environment(), vec!["TZ=Asia/Shanghai".to_string()]);
    }
}
