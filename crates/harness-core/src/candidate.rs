//! Candidate configuration (spec §3 "Candidate").

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// One configuration of an agent under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique label used as the proxy user id, output root, and log prefix.
    pub run_name: String,
    pub agent_docker_image: String,
    pub llm_quota_total: f64,
    pub llm_quota_instance: f64,
    /// Carry the memory directory across instances of a project.
    #[serde(default)]
    pub enable_memory: bool,
    pub timeout_s: u64,
}

/// Load `candidates.json`: a list of candidate records.
pub fn load_candidates(path: &Path) -> Result<Vec<Candidate>> {
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str(&data)
        .map_err(|e| HarnessError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Load `projects.json`: a list of projects, each an ordered list of
/// instance ids that may share cross-instance memory.
pub fn load_projects(path: &Path) -> Result<Vec<Vec<String>>> {
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str(&data)
        .map_err(|e| HarnessError::Config(format!("failed to parse {}: {e}", path.display())))
}
