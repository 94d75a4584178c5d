//! Preflight (spec §4.K): cleans prior results, verifies paths,
//! health-checks the proxy, and pulls missing images before any candidate
//! starts.

use std::collections::BTreeSet;
use std::time::Duration;

use bollard::image::CreateImageOptions;
use futures_util::StreamExt;
use tracing::{info, warn};

use crate::candidate::Candidate;
use crate::catalog::BenchmarkCatalog;
use crate::config::HarnessConfig;
use crate::docker;
use crate::error::{HarnessError, Result};
use crate::proxy_client::ProxyControlClient;

/// How long preflight waits after printing the "will delete existing
/// results" warning before actually deleting (spec §4.K.c).
const RESULT_CLEANUP_WARNING: Duration = Duration::from_secs(10);

pub struct Preflight;

impl Preflight {
    /// Run every preflight check. Any failure here aborts the whole run
    /// (spec §7 "Preflight failure").
    pub async fn run(
        candidates: &[Candidate],
        projects: &[Vec<String>],
        catalog: &BenchmarkCatalog,
        cfg: &HarnessConfig,
    ) -> Result<()> {
        require_root()?;
        verify_paths(cfg)?;
        cleanup_prior_results(candidates, cfg, RESULT_CLEANUP_WARNING).await?;

        let proxy = ProxyControlClient::new(cfg.controller_base_url.clone());
        health_check_controller(&proxy).await?;
        health_check_proxy_from_sandbox_network(cfg).await?;

        pull_missing_images(candidates, projects, catalog, cfg).await?;
        info!("preflight checks passed");
        Ok(())
    }
}

#[cfg(unix)]
fn require_root() -> Result<()> {
    // SAFETY: geteuid takes no arguments and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        return Err(HarnessError::Config(
            "harness must run as root to re-own container-created files".into(),
        ));
    }
    Ok(())
}

#[cfg(not(unix))]
fn require_root() -> Result<()> {
    Err(HarnessError::Config(
        "harness requires a unix host to run the preflight root check".into(),
    ))
}

fn verify_paths(cfg: &HarnessConfig) -> Result<()> {
    if !cfg.sshbox_script_path.exists() {
        return Err(HarnessError::Config(format!(
            "sandbox scripts path does not exist: {}",
            cfg.sshbox_script_path.display()
        )));
    }
    if !cfg.litellm_traj_dir.exists() {
        return Err(HarnessError::Config(format!(
            "trajectory root does not exist: {}",
            cfg.litellm_traj_dir.display()
        )));
    }
    std::fs::create_dir_all(&cfg.result_root)?;
    std::fs::create_dir_all(&cfg.work_root)?;
    Ok(())
}

async fn cleanup_prior_results(
    candidates: &[Candidate],
    cfg: &HarnessConfig,
    warning_delay: Duration,
) -> Result<()> {
    let stale: Vec<_> = candidates
        .iter()
        .map(|c| cfg.result_root.join(&c.run_name))
        .filter(|p| p.exists())
        .collect();

    if stale.is_empty() {
        return Ok(());
    }

    for path in &stale {
        println!("found existing results: {}", path.display());
    }
    println!(
        "WARNING: will cleanup {} existing result tree(s) in {} seconds, CTRL+C NOW to abort",
        stale.len(),
        warning_delay.as_secs()
    );
    tokio::time::sleep(warning_delay).await;

    for path in &stale {
        std::fs::remove_dir_all(path)?;
    }
    Ok(())
}

async fn health_check_controller(proxy: &ProxyControlClient) -> Result<()> {
    let report = proxy.health().await?;
    if !report.compat.iter().any(|tag| tag == "v1") {
        return Err(HarnessError::Proxy(format!(
            "controller does not report v1 compatibility: {:?}",
            report.compat
        )));
    }
    Ok(())
}

/// Health-check the model proxy itself from inside a throwaway container
/// on the `infra` network, since the harness host may not otherwise be
/// able to reach it. Expects an HTTP 200 from the liveliness endpoint.
async fn health_check_proxy_from_sandbox_network(cfg: &HarnessConfig) -> Result<()> {
    let docker = docker::client()?;
    let liveliness_url = format!("{}health/liveliness", cfg.proxy_base_url_in_docker);

    let config = bollard::container::Config {
        image: Some("curlimages/curl:8.6.0".to_string()),
        cmd: Some(vec![
            "-s".to_string(),
            "-o".to_string(),
            "/dev/null".to_string(),
            "-w".to_string(),
            "%{http_code}".to_string(),
            liveliness_url,
        ]),
        host_config: Some(bollard::service::HostConfig {
            network_mode: Some(docker::NETWORK_INFRA.to_string()),
            auto_remove: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };

    let created = docker
        .create_container(
            Some(bollard::container::CreateContainerOptions {
                name: "preflight-proxy-healthcheck",
                platform: None,
            }),
            config,
        )
        .await?;

    docker
        .start_container::<String>(&created.id, None)
        .await?;
    let mut wait_stream = docker.wait_container(
        &created.id,
        Some(bollard::container::WaitContainerOptions {
            condition: "not-running",
        }),
    );
    let _ = wait_stream.next().await;

    let mut logs = docker.logs::<String>(
        &created.id,
        Some(bollard::container::LogsOptions {
            stdout: true,
            stderr: true,
            ..Default::default()
        }),
    );
    let mut output = String::new();
    while let Some(Ok(chunk)) = logs.next().await {
        output.push_str(&chunk.to_string());
    }

    if output.trim() != "200" {
        return Err(HarnessError::Proxy(format!(
            "model proxy liveliness check returned {output:?}, expected 200"
        )));
    }
    Ok(())
}

/// Every image a run might need: each candidate's agent image, plus the
/// derived sandbox image for every referenced instance.
pub fn referenced_images(
    candidates: &[Candidate],
    projects: &[Vec<String>],
    catalog: &BenchmarkCatalog,
    docker_image_base: &str,
) -> Result<BTreeSet<String>> {
    let mut images = BTreeSet::new();
    for candidate in candidates {
        images.insert(candidate.agent_docker_image.clone());
    }
    for project in projects {
        for instance_id in project {
            let row = catalog.lookup(instance_id)?;
            let tag = crate::catalog::derive_image_tag(&row.repo, instance_id);
            images.insert(format!("{docker_image_base}:{tag}"));
        }
    }
    Ok(images)
}

async fn pull_missing_images(
    candidates: &[Candidate],
    projects: &[Vec<String>],
    catalog: &BenchmarkCatalog,
    cfg: &HarnessConfig,
) -> Result<()> {
    let images = referenced_images(candidates, projects, catalog, &cfg.docker_image_base)?;
    let docker = docker::client()?;

    for image in images {
        if docker.inspect_image(&image).await.is_ok() {
            continue;
        }
        info!(image, "image not present locally, pulling");
        let mut stream = docker.create_image(
            Some(CreateImageOptions {
                from_image: image.clone(),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = stream.next().await {
            if let Err(e) = progress {
                warn!(image, error = %e, "image pull failed");
                return Err(HarnessError::Docker(format!(
                    "failed to pull {image}: {e}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BenchmarkRow;

    fn candidate(run_name: &str) -> Candidate {
        Candidate {
            run_name: run_name.to_string(),
            agent_docker_image: "agent:1".to_string(),
            llm_quota_total: 10.0,
            llm_quota_instance: 1.0,
            enable_memory: false,
            timeout_s: 60,
        }
    }

    fn row(instance_id: &str, repo: &str) -> BenchmarkRow {
        BenchmarkRow {
            instance_id: instance_id.to_string(),
            repo: repo.to_string(),
            repo_language: "python".to_string(),
            problem_statement: "fix it".to_string(),
            requirements: String::new(),
            interface: String::new(),
        }
    }

    #[test]
    fn referenced_images_includes_candidate_and_sandbox_images() {
        let catalog = BenchmarkCatalog::from_rows(vec![row("instance_a", "foo/bar")]);
        let candidates = vec![candidate("c1")];
        let projects = vec![vec!["instance_a".to_string()]];

        let images =
            referenced_images(&candidates, &projects, &catalog, "example.registry/repair")
                .unwrap();

        assert!(images.contains("agent:1"));
        assert!(images.contains("example.registry/repair:foo.bar-a"));
    }

    #[test]
    fn referenced_images_rejects_unknown_instance() {
        let catalog = BenchmarkCatalog::from_rows(vec![]);
        let candidates = vec![candidate("c1")];
        let projects = vec![vec!["instance_missing".to_string()]];

        let result =
            referenced_images(&candidates, &projects, &catalog, "example.registry/repair");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cleanup_prior_results_is_a_noop_when_nothing_stale() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("DOCKER_IMAGE_BASE", "example.registry/repair");
        let mut cfg = HarnessConfig::from_env().unwrap();
        std::env::remove_var("DOCKER_IMAGE_BASE");
        cfg.result_root = dir.path().join("results");

        let candidates = vec![candidate("c1")];
        cleanup_prior_results(&candidates, &cfg, Duration::from_millis(0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cleanup_prior_results_removes_stale_tree_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("DOCKER_IMAGE_BASE", "example.registry/repair");
        let mut cfg = HarnessConfig::from_env().unwrap();
        std::env::remove_var("DOCKER_IMAGE_BASE");
        cfg.result_root = dir.path().join("results");

        let candidates = vec![candidate("c1")];
        let stale_dir = cfg.result_root.join("c1");
        std::fs::create_dir_all(&stale_dir).unwrap();
        std::fs::write(stale_dir.join("instance.json"), b"{}").unwrap();

        cleanup_prior_results(&candidates, &cfg, Duration::from_millis(1))
            .await
            .unwrap();
        assert!(!stale_dir.exists());
    }
}
