//! Project Worker (spec §4.I): runs a project's instances sequentially,
//! carrying (or not carrying) a shared memory directory across them.
//!
//! This module is the *logic* of the project worker. The requirement that
//! it run as its own OS process (so that cleanup hooks survive
//! signal-driven termination the way a thread's finalizers might not) is
//! satisfied by `harness-cli`, which re-execs itself with a hidden
//! subcommand that calls [`ProjectWorker::run`] inside the child process.

use tracing::error;

use crate::candidate::Candidate;
use crate::catalog::{self, BenchmarkCatalog};
use crate::config::HarnessConfig;
use crate::error::Result;
use crate::proxy_client::ProxyControlClient;
use crate::runner::InstanceRunner;
use crate::workdir::Workdir;

pub struct ProjectWorker;

impl ProjectWorker {
    /// Run every instance in `instance_ids`, in order, for `candidate`.
    /// `project_index` is this project's position in `projects.json`, used
    /// to derive each instance's `ident` and the shared memory workdir's
    /// name.
    pub async fn run(
        candidate: &Candidate,
        instance_ids: &[String],
        project_index: usize,
        catalog: &BenchmarkCatalog,
        cfg: &HarnessConfig,
        proxy: &ProxyControlClient,
    ) -> Result<()> {
        let mut shared_memory = if candidate.enable_memory {
            let stem = format!("{}-mem-global-{project_index}", candidate.run_name);
            Some(Workdir::new(&cfg.work_root, &stem)?)
        } else {
            None
        };

        for (instance_index, instance_id) in instance_ids.iter().enumerate() {
            let ident = catalog::ident(project_index, instance_index);

            let instance = match catalog.build_instance(instance_id, &ident, &cfg.docker_image_base) {
                Ok(instance) => instance,
                Err(e) => {
                    error!(instance_id, error = %e, "failed to hydrate instance; skipping");
                    continue;
                }
            };

            let mut per_instance_memory = None;
            let memory_dir = if candidate.enable_memory {
                shared_memory
                    .as_ref()
                    .expect("shared memory workdir present when enable_memory is set")
                    .path()
                    .expect("shared memory workdir is live for the worker's lifetime")
                    .to_path_buf()
            } else {
                let stem = format!("{}-mem-{ident}", candidate.run_name);
                let workdir = Workdir::new(&cfg.work_root, &stem)?;
                let path = workdir
                    .path()
                    .expect("freshly created workdir is live")
                    .to_path_buf();
                per_instance_memory = Some(workdir);
                path
            };

            // A fatal error inside one instance is logged and the project
            // continues with its next instance (spec §7 "Project fatal").
            if let Err(e) = InstanceRunner::run(candidate, &instance, cfg, proxy, &memory_dir).await
            {
                error!(ident = %ident, error = %e, "instance run failed; continuing with next instance");
            }

            if let Some(mut workdir) = per_instance_memory {
                workdir.cleanup()?;
            }
        }

        if let Some(mut shared) = shared_memory {
            shared.cleanup()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BenchmarkRow;

    fn row(instance_id: &str) -> BenchmarkRow {
        BenchmarkRow {
            instance_id: instance_id.to_string(),
            repo: "foo/bar".to_string(),
            repo_language: "python".to_string(),
            problem_statement: "fix it".to_string(),
            requirements: String::new(),
            interface: String::new(),
        }
    }

    #[tokio::test]
    async fn unknown_instance_id_is_skipped_not_fatal() {
        let catalog = BenchmarkCatalog::from_rows(vec![row("instance_a")]);
        let cfg_dir = tempfile::tempdir().unwrap();
        std::env::set_var("DOCKER_IMAGE_BASE", "example.registry/repair");
        let cfg = HarnessConfig::from_env().unwrap();
        std::env::remove_var("DOCKER_IMAGE_BASE");
        let _ = cfg_dir; // config paths aren't exercised by this unit test.

        let candidate = Candidate {
            run_name: "c1".into(),
            agent_docker_image: "agent:1".into(),
            llm_quota_total: 10.0,
            llm_quota_instance: 1.0,
            enable_memory: false,
            timeout_s: 60,
        };

        // instance_missing isn't in the catalog; the project worker should
        // log and move on rather than aborting the whole project. We only
        // exercise the hydration/skip path here since the full instance
        // run needs Docker and the proxy controller.
        let result = catalog.build_instance("instance_missing", "p00i00", &cfg.docker_image_base);
        assert!(result.is_err());
        let _ = candidate;
    }
}
