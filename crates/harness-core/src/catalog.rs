//! Benchmark Catalog (spec §4.A): indexes instances by id and derives each
//! instance's sandbox image tag.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// One row of the tabular benchmark source, keyed by `instance_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkRow {
    pub instance_id: String,
    pub repo: String,
    pub repo_language: String,
    pub problem_statement: String,
    pub requirements: String,
    pub interface: String,
}

/// The projection of a benchmark row written to `instance.json`.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceInput {
    pub repo: String,
    pub repo_language: String,
    pub problem_statement: String,
    pub requirements: String,
    pub interface: String,
}

impl From<&BenchmarkRow> for InstanceInput {
    fn from(row: &BenchmarkRow) -> Self {
        Self {
            repo: row.repo.clone(),
            repo_language: row.repo_language.clone(),
            problem_statement: row.problem_statement.clone(),
            requirements: row.requirements.clone(),
            interface: row.interface.clone(),
        }
    }
}

/// A single hydrated benchmark instance: catalog row plus derived fields.
#[derive(Debug, Clone)]
pub struct Instance {
    pub instance_id: String,
    /// Short label `pPPiII` used as the proxy key alias and output subdir.
    pub ident: String,
    /// `<docker_image_base>:<derived tag>`.
    pub sandbox_image: String,
    pub input: InstanceInput,
}

/// In-memory index of the benchmark tabular source, loaded once at startup.
pub struct BenchmarkCatalog {
    rows: HashMap<String, BenchmarkRow>,
}

impl BenchmarkCatalog {
    /// Load the benchmark CSV file and index it by `instance_id`.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| HarnessError::Catalog(format!("failed to open {}: {e}", path.display())))?;

        let mut rows = HashMap::new();
        for record in reader.deserialize() {
            let row: BenchmarkRow = record
                .map_err(|e| HarnessError::Catalog(format!("malformed row: {e}")))?;
            rows.insert(row.instance_id.clone(), row);
        }
        Ok(Self { rows })
    }

    /// Construct a catalog directly from in-memory rows (used by tests and
    /// by callers that already have the data deserialized some other way).
    pub fn from_rows(rows: Vec<BenchmarkRow>) -> Self {
        Self {
            rows: rows.into_iter().map(|r| (r.instance_id.clone(), r)).collect(),
        }
    }

    /// Look up a row by instance id. An unknown id is fatal to preflight
    /// (spec §4.A).
    pub fn lookup(&self, instance_id: &str) -> Result<&BenchmarkRow> {
        self.rows
            .get(instance_id)
            .ok_or_else(|| HarnessError::Catalog(format!("unknown instance id: {instance_id}")))
    }

    /// Hydrate a full [`Instance`] for `instance_id`, tagging it with the
    /// given `ident` and deriving its sandbox image from `docker_image_base`.
    pub fn build_instance(
        &self,
        instance_id: &str,
        ident: &str,
        docker_image_base: &str,
    ) -> Result<Instance> {
        let row = self.lookup(instance_id)?;
        let tag = derive_image_tag(&row.repo, instance_id);
        Ok(Instance {
            instance_id: instance_id.to_string(),
            ident: ident.to_string(),
            sandbox_image: format!("{docker_image_base}:{tag}"),
            input: InstanceInput::from(row),
        })
    }
}

/// Short label `pPPiII` used as the proxy key alias and the output
/// subdirectory name (spec §3 "Instance").
pub fn ident(project_index: usize, instance_index: usize) -> String {
    format!("p{project_index:02}i{instance_index:02}")
}

const SPECIAL_ELEMENT_WEB_ID: &str =
    "instance_element-hq__element-web-ec0f940ef0e8e3b61078f145f34dc40d1938e6c5-vnan";

/// Derive the sandbox image tag for a row (spec §3 "Sandbox image tag
/// derivation"): lowercased `repo_base.repo_name_only-hash`, with the three
/// documented special cases, truncated to 128 characters.
pub fn derive_image_tag(repo: &str, instance_id: &str) -> String {
    let repo_lower = repo.to_lowercase();
    let mut parts = repo_lower.splitn(2, '/');
    let repo_base = parts.next().unwrap_or("").to_string();
    let mut repo_name_only = parts.next().unwrap_or("").to_string();

    let mut hsh = instance_id.replace("instance_", "");

    if instance_id == SPECIAL_ELEMENT_WEB_ID {
        repo_name_only = "element-web".to_string();
    } else if repo_lower == "element-hq/element-web" {
        repo_name_only = "element".to_string();
        if let Some(stripped) = hsh.strip_suffix("-vnan") {
            hsh = stripped.to_string();
        }
    } else if let Some(stripped) = hsh.strip_suffix("-vnan") {
        hsh = stripped.to_string();
    }

    let tag = format!("{repo_base}.{repo_name_only}-{hsh}").to_lowercase();
    tag.chars().take(128).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(instance_id: &str, repo: &str) -> BenchmarkRow {
        BenchmarkRow {
            instance_id: instance_id.to_string(),
            repo: repo.to_string(),
            repo_language: "python".to_string(),
            problem_statement: "fix the bug".to_string(),
            requirements: "".to_string(),
            interface: "".to_string(),
        }
    }

    #[test]
    fn default_case_strips_vnan_suffix() {
        let tag = derive_image_tag("Foo/Bar", "instance_abc123-vnan");
        assert_eq!(tag, "foo.bar-abc123");
    }

    #[test]
    fn default_case_without_vnan_suffix_unchanged() {
        let tag = derive_image_tag("Foo/Bar", "instance_abc123");
        assert_eq!(tag, "foo.bar-abc123");
    }

    #[test]
    fn element_hq_element_web_becomes_element_and_strips_vnan() {
        let tag = derive_image_tag("element-hq/element-web", "instance_deadbeef-vnan");
        assert_eq!(tag, "element-hq.element-deadbeef");
    }

    #[test]
    fn special_cased_element_web_id_keeps_full_name_and_hash() {
        let tag = derive_image_tag("element-hq/element-web", SPECIAL_ELEMENT_WEB_ID);
        assert_eq!(
            tag,
            "element-hq.element-web-ec0f940ef0e8e3b61078f145f34dc40d1938e6c5-vnan"
        );
    }

    #[test]
    fn tag_is_truncated_to_128_chars() {
        let long_repo = format!("base/{}", "x".repeat(200));
        let tag = derive_image_tag(&long_repo, "instance_abc");
        assert!(tag.chars().count() <= 128);
    }

    #[test]
    fn lookup_unknown_instance_is_an_error() {
        let catalog = BenchmarkCatalog::from_rows(vec![row("instance_a", "foo/bar")]);
        assert!(catalog.lookup("instance_missing").is_err());
    }

    #[test]
    fn build_instance_projects_exactly_five_fields() {
        let catalog = BenchmarkCatalog::from_rows(vec![row("instance_a", "foo/bar")]);
        let instance = catalog
            .build_instance("instance_a", &ident(0, 0), "registry/repair")
            .unwrap();
        assert_eq!(instance.ident, "p00i00");
        assert_eq!(instance.sandbox_image, "registry/repair:foo.bar-a");
        let json = serde_json::to_value(&instance.input).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "interface",
                "problem_statement",
                "repo",
                "repo_language",
                "requirements"
            ]
        );
    }

    #[test]
    fn ident_formats_zero_padded() {
        assert_eq!(ident(0, 0), "p00i00");
        assert_eq!(ident(3, 12), "p03i12");
    }
}
