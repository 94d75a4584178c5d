//! Instance Runner (spec §4.H): the orchestration heart. Composes the
//! Workdir, Proxy Control Client, Sandbox Cell, and Agent Cell for a single
//! instance, in the exact order spec §5 "Ordering guarantees" requires.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::agent_cell::{AgentCell, AgentCellArgs, AgentOutcome};
use crate::candidate::Candidate;
use crate::catalog::Instance;
use crate::config::HarnessConfig;
use crate::error::Result;
use crate::platform::owner::reown_tree;
use crate::platform::snapshot::HostSnapshot;
use crate::proxy_client::{CreatedKey, ProxyControlClient};
use crate::sandbox::SandboxCell;
use crate::workdir::Workdir;

/// Runs one instance end-to-end, including guaranteed cleanup of the log
/// workdir regardless of how the inner steps fail.
pub struct InstanceRunner;

impl InstanceRunner {
    /// Run `instance` for `candidate`, using `memory_dir` as the (already
    /// resolved, per project-worker policy) memory scratch directory.
    pub async fn run(
        candidate: &Candidate,
        instance: &Instance,
        cfg: &HarnessConfig,
        proxy: &ProxyControlClient,
        memory_dir: &Path,
    ) -> Result<()> {
        let result_dir = cfg
            .result_root
            .join(&candidate.run_name)
            .join(&instance.ident);
        if result_dir.exists() {
            std::fs::remove_dir_all(&result_dir)?;
        }
        std::fs::create_dir_all(&result_dir)?;

        let stem = format!("{}-{}-log", candidate.run_name, instance.ident);
        let mut log_workdir = Workdir::new(&cfg.work_root, &stem)?;

        let memory_dir_owned = memory_dir.to_path_buf();
        let harness_dest = result_dir.join("_harness");
        let result_dir_for_hook = result_dir.clone();
        let owner = cfg.owner;
        log_workdir.set_cleanup_hook(move |handle| {
            let Some(log_path) = handle.path() else {
                return;
            };
            let memory_dest = log_path.join("memory");
            if let Err(e) = copy_dir_recursive(&memory_dir_owned, &memory_dest) {
                warn!(error = %e, "failed to snapshot memory directory into log workdir");
            }

            if harness_dest.exists() {
                if let Err(e) = std::fs::remove_dir_all(&harness_dest) {
                    warn!(error = %e, "failed to remove stale _harness directory");
                }
            }
            if std::fs::rename(log_path, &harness_dest).is_err() {
                // Cross-filesystem move: fall back to copy (spec §9 open
                // question on same-filesystem assumptions).
                if let Err(e) = copy_dir_recursive(log_path, &harness_dest) {
                    error!(error = %e, "failed to relocate log workdir into result tree");
                }
                let _ = std::fs::remove_dir_all(log_path);
            }

            if let Err(e) = reown_tree(&result_dir_for_hook, owner) {
                warn!(error = %e, "permission normalization failed");
            }
        });

        let log_dir = log_workdir
            .path()
            .expect("freshly created workdir is live")
            .to_path_buf();

        let result =
            Self::run_inner(candidate, instance, cfg, proxy, memory_dir, &log_dir, &result_dir)
                .await;
        if let Err(e) = &result {
            error!(ident = %instance.ident, error = %e, "instance runner failed");
        }

        log_workdir.cleanup()?;
        result
    }

    async fn run_inner(
        candidate: &Candidate,
        instance: &Instance,
        cfg: &HarnessConfig,
        proxy: &ProxyControlClient,
        memory_dir: &Path,
        log_dir: &Path,
        result_dir: &Path,
    ) -> Result<()> {
        let key = proxy
            .create_key(&candidate.run_name, &instance.ident, candidate.llm_quota_instance)
            .await?;

        let system_log_path = log_dir.join("system.log");
        let mut system_log = std::fs::File::create(&system_log_path)?;

        let pcap_dir = log_dir.join("pcap");
        std::fs::create_dir_all(&pcap_dir)?;

        let sandbox_name = format!("sandbox-{}-{}", candidate.run_name, instance.ident);
        let sandbox = match SandboxCell::start(instance, &pcap_dir, cfg, &sandbox_name).await {
            Ok(sandbox) => sandbox,
            Err(e) => {
                let _ = writeln!(system_log, "sandbox start failed: {e}");
                if let Err(delete_err) = proxy.delete_key(&key.key).await {
                    warn!(error = %delete_err, "delete_key failed (swallowed)");
                }
                return Err(e);
            }
        };

        let instance_json_path = result_dir.join("instance.json");
        let write_result = write_instance_json(&instance_json_path, instance);

        let agent_result = match write_result {
            Ok(()) => {
                Self::run_agent(
                    candidate,
                    instance,
                    cfg,
                    proxy,
                    &key,
                    &sandbox.connection_string,
                    memory_dir,
                    result_dir,
                    log_dir,
                    &mut system_log,
                )
                .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = proxy.delete_key(&key.key).await {
            warn!(error = %e, key_hash = %key.hash, "delete_key failed (swallowed)");
            let _ = writeln!(system_log, "delete_key failed: {e}");
        }

        sandbox.stop().await;
        drop(system_log);

        tokio::time::sleep(Duration::from_secs(1)).await;
        relocate_trajectory(&cfg.litellm_traj_dir, &key.hash, log_dir);

        agent_result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_agent(
        candidate: &Candidate,
        instance: &Instance,
        cfg: &HarnessConfig,
        proxy: &ProxyControlClient,
        key: &CreatedKey,
        ssh: &str,
        memory_dir: &Path,
        result_dir: &Path,
        log_dir: &Path,
        system_log: &mut std::fs::File,
    ) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let snapshot = HostSnapshot::capture();
        let _ = writeln!(
            system_log,
            "{}",
            serde_json::to_string(&snapshot).unwrap_or_default()
        );

        let agent_log_path = log_dir.join("agent.log");
        let args = AgentCellArgs {
            instance_path: result_dir,
            memory_path: memory_dir,
            llm_base_url: cfg.proxy_base_url_in_docker.as_str(),
            llm_api_key: &key.key,
            env_ssh: ssh,
            image: &candidate.agent_docker_image,
            log_path: &agent_log_path,
            run_name: &candidate.run_name,
            ident: &instance.ident,
            verbose: cfg.verbose,
            rootfs_device: &cfg.rootfs_device,
        };

        let cell = AgentCell::start(args).await?;
        let outcome = cell.wait(Duration::from_secs(candidate.timeout_s)).await;

        match &outcome {
            Ok(AgentOutcome::TimedOut) => {
                let _ = writeln!(system_log, "agent timeout");
            }
            Ok(AgentOutcome::Exited { status_code }) => {
                let _ = writeln!(system_log, "agent exited with status {status_code}");
            }
            Err(e) => {
                let _ = writeln!(system_log, "agent wait error: {e}");
            }
        }

        match proxy.query_balance(&candidate.run_name, &key.key).await {
            Ok(balance) => {
                let _ = writeln!(
                    system_log,
                    "balance: {}",
                    serde_json::to_string(&balance).unwrap_or_default()
                );
            }
            Err(e) => {
                let _ = writeln!(system_log, "query_balance failed: {e}");
            }
        }

        cell.stop().await;

        info!(ident = %instance.ident, "agent cell finished");
        outcome.map(|_| ())
    }
}

fn write_instance_json(path: &Path, instance: &Instance) -> Result<()> {
    let json = serde_json::to_string_pretty(&instance.input)
        .map_err(|e| crate::error::HarnessError::Artifact(format!("serialize instance.json: {e}")))?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Move `<traj_root>/<keyhash[..20]>` to `<log_dir>/traj`, if present. The
/// proxy writes trajectories outside the harness's control; by this point
/// the key has already been deleted, so no further writes can arrive.
fn relocate_trajectory(traj_root: &Path, keyhash: &str, log_dir: &Path) {
    let prefix_len = keyhash.len().min(20);
    let src = traj_root.join(&keyhash[..prefix_len]);
    if !src.exists() {
        return;
    }
    let dest = log_dir.join("traj");
    if std::fs::rename(&src, &dest).is_err() {
        if let Err(e) = copy_dir_recursive(&src, &dest) {
            warn!(error = %e, "failed to relocate trajectory directory");
            return;
        }
        let _ = std::fs::remove_dir_all(&src);
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> std::io::Result<()> {
    if !src.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let dest_path = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocate_trajectory_is_a_noop_when_source_missing() {
        let dir = tempfile::tempdir().unwrap();
        relocate_trajectory(dir.path(), "0123456789abcdef0123", dir.path());
        assert!(!dir.path().join("traj").exists());
    }

    #[test]
    fn relocate_trajectory_moves_keyhash_dir() {
        let traj_root = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        let keyhash = "0123456789abcdef0123";
        let src = traj_root.path().join(keyhash);
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("call.json"), b"{}").unwrap();

        relocate_trajectory(traj_root.path(), keyhash, log_dir.path());

        assert!(!src.exists());
        assert!(log_dir.path().join("traj/call.json").exists());
    }

    #[test]
    fn copy_dir_recursive_copies_nested_contents() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("nested")).unwrap();
        std::fs::write(src.path().join("nested/f.txt"), b"data").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let dest_path = dest.path().join("copy");
        copy_dir_recursive(src.path(), &dest_path).unwrap();

        assert_eq!(
            std::fs::read_to_string(dest_path.join("nested/f.txt")).unwrap(),
            "data"
        );
    }

    #[test]
    fn write_instance_json_writes_pretty_projection() {
        let instance = Instance {
            instance_id: "instance_a".into(),
            ident: "p00i00".into(),
            sandbox_image: "base:tag".into(),
            input: crate::catalog::InstanceInput {
                repo: "foo/bar".into(),
                repo_language: "python".into(),
                problem_statement: "fix it".into(),
                requirements: "".into(),
                interface: "".into(),
            },
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instance.json");
        write_instance_json(&path, &instance).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"repo\""));
        assert!(contents.contains("fix it"));
    }
}
