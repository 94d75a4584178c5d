mod spawner;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use harness_core::candidate::{load_candidates, load_projects, Candidate};
use harness_core::candidate_driver::CandidateDriver;
use harness_core::catalog::BenchmarkCatalog;
use harness_core::config::HarnessConfig;
use harness_core::preflight::Preflight;
use harness_core::project_worker::ProjectWorker;
use harness_core::proxy_client::ProxyControlClient;

use spawner::ReExecSpawner;

#[derive(Parser)]
#[command(name = "harness", version, about = "Agent evaluation harness")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every candidate in `candidates.json` across every project in
    /// `projects.json`, one candidate at a time (spec §5).
    Run {
        #[arg(long)]
        candidates: PathBuf,
        #[arg(long)]
        projects: PathBuf,
        #[arg(long)]
        catalog: PathBuf,
    },
    /// Re-exec target for a single project worker. Not meant to be invoked
    /// directly; `run` spawns this as its own OS process per project.
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        candidate_file: PathBuf,
        #[arg(long)]
        instance_ids_file: PathBuf,
        #[arg(long)]
        project_index: usize,
        #[arg(long)]
        catalog: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    harness_core::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            candidates,
            projects,
            catalog,
        } => run(candidates, projects, catalog).await,
        Command::Worker {
            candidate_file,
            instance_ids_file,
            project_index,
            catalog,
        } => worker(candidate_file, instance_ids_file, project_index, catalog).await,
    }
}

async fn run(candidates_path: PathBuf, projects_path: PathBuf, catalog_path: PathBuf) -> Result<()> {
    let cfg = HarnessConfig::from_env()?;
    let catalog = BenchmarkCatalog::load(&catalog_path)?;
    let candidates = load_candidates(&candidates_path)?;
    let projects = load_projects(&projects_path)?;

    Preflight::run(&candidates, &projects, &catalog, &cfg).await?;

    let proxy = ProxyControlClient::new(cfg.controller_base_url.clone());
    let spawner = ReExecSpawner {
        catalog_path: catalog_path.clone(),
    };

    // One candidate at a time across all of its projects (spec §5): the
    // next candidate's user scope doesn't open until this one's has fully
    // closed.
    for candidate in &candidates {
        tracing::info!(run_name = %candidate.run_name, "starting candidate");
        CandidateDriver::run(candidate, &projects, &proxy, &spawner).await?;
        tracing::info!(run_name = %candidate.run_name, "candidate finished");
    }

    Ok(())
}

async fn worker(
    candidate_file: PathBuf,
    instance_ids_file: PathBuf,
    project_index: usize,
    catalog_path: PathBuf,
) -> Result<()> {
    let cfg = HarnessConfig::from_env()?;
    let catalog = BenchmarkCatalog::load(&catalog_path)?;

    let candidate: Candidate = serde_json::from_str(&std::fs::read_to_string(&candidate_file)?)?;
    let instance_ids: Vec<String> =
        serde_json::from_str(&std::fs::read_to_string(&instance_ids_file)?)?;

    let proxy = ProxyControlClient::new(cfg.controller_base_url.clone());
    ProjectWorker::run(&candidate, &instance_ids, project_index, &catalog, &cfg, &proxy).await?;
    Ok(())
}
