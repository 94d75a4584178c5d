//! The real `ProjectSpawner`: re-execs this same binary into a hidden
//! `worker` subcommand, one OS process per project (spec §4.I / §9),
//! grounded in `daemon_process.rs`'s self-location-then-spawn pattern.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use harness_core::candidate::Candidate;
use harness_core::error::{HarnessError, Result};
use harness_core::candidate_driver::{ProjectHandle, ProjectSpawner};
use tempfile::TempDir;
use tokio::process::Child;

/// Spawns a project worker by re-exec'ing the current executable with
/// `worker --candidate-file ... --instance-ids-file ... --project-index N`.
pub struct ReExecSpawner {
    pub catalog_path: PathBuf,
}

#[async_trait]
impl ProjectSpawner for ReExecSpawner {
    async fn spawn(
        &self,
        candidate: &Candidate,
        project_index: usize,
        instance_ids: &[String],
    ) -> Result<Box<dyn ProjectHandle>> {
        let exe = std::env::current_exe()
            .map_err(|e| HarnessError::Config(format!("cannot resolve own executable: {e}")))?;

        // Arguments are handed to the child as files rather than inline
        // JSON: instance id lists for a large project can exceed a
        // comfortable argv length, and the child outlives this call.
        let args_dir = tempfile::Builder::new()
            .prefix("harness-worker-args-")
            .tempdir()
            .map_err(HarnessError::Io)?;
        let candidate_path = args_dir.path().join("candidate.json");
        let ids_path = args_dir.path().join("instance_ids.json");
        std::fs::write(&candidate_path, serde_json::to_vec(candidate).unwrap())?;
        std::fs::write(&ids_path, serde_json::to_vec(instance_ids).unwrap())?;

        let child = tokio::process::Command::new(&exe)
            .arg("worker")
            .arg("--candidate-file")
            .arg(&candidate_path)
            .arg("--instance-ids-file")
            .arg(&ids_path)
            .arg("--project-index")
            .arg(project_index.to_string())
            .arg("--catalog")
            .arg(&self.catalog_path)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| HarnessError::Config(format!("failed to spawn project worker: {e}")))?;

        Ok(Box::new(ReExecHandle {
            child,
            _args_dir: args_dir,
        }))
    }
}

struct ReExecHandle {
    child: Child,
    // Held alive until the worker process has had a chance to read its
    // argument files; dropped (and the directory removed) once `join`
    // returns.
    _args_dir: TempDir,
}

#[async_trait]
impl ProjectHandle for ReExecHandle {
    async fn join(mut self: Box<Self>) -> Result<()> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| HarnessError::Config(format!("project worker wait failed: {e}")))?;
        if !status.success() {
            return Err(HarnessError::Config(format!(
                "project worker exited with {status}"
            )));
        }
        Ok(())
    }
}
