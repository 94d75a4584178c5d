//! Trajectory Logger (spec §4.E): the proxy's success/failure callback
//! contract, writing one JSON record per model call keyed by key hash.

use std::path::PathBuf;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// One model-call record (spec §3 "Trajectory Record").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrajectoryRecord {
    pub status: String,
    pub keyhash: String,
    pub user_id: Option<String>,
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub call_type: Option<String>,
    pub model: Option<String>,
    pub usage_object: Option<serde_json::Value>,
    pub cost_breakdown: Option<serde_json::Value>,
    pub model_parameters: Option<serde_json::Value>,
    pub instructions: Option<serde_json::Value>,
    pub messages: Option<serde_json::Value>,
    pub error_information: Option<serde_json::Value>,
    pub response: Option<serde_json::Value>,
    pub response_headers: Option<serde_json::Value>,
}

/// Writes trajectory records under `<base_path>/<keyhash[..20]>/<serial>.json`.
/// Best-effort: never panics or propagates an error into the proxy.
pub struct TrajectoryLogger {
    base_path: PathBuf,
}

impl TrajectoryLogger {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn write(&self, record: &TrajectoryRecord) {
        let dir = self
            .base_path
            .join(&record.keyhash[..record.keyhash.len().min(20)]);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            eprintln!("trajectory logger: failed to create {}: {e}", dir.display());
            return;
        }

        let serial = format!(
            "{:.0}_{:06}",
            record.start_time * 1000.0,
            rand::thread_rng().gen_range(0..1_000_000)
        );
        let path = dir.join(format!("{serial}.json"));

        match serde_json::to_vec_pretty(record) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&path, bytes) {
                    eprintln!("trajectory logger: failed to write {}: {e}", path.display());
                }
            }
            Err(e) => {
                // The path is already established; overwrite it with an
                // exception record rather than lose the call entirely
                // (spec §4.E "any exception during serialization produces
                // a fallback exception record at the same path").
                let fallback = json!({
                    "status": "exception",
                    "exception_type": "SerializationError",
                    "exception_message": e.to_string(),
                });
                let _ = std::fs::write(
                    &path,
                    serde_json::to_vec_pretty(&fallback).unwrap_or_default(),
                );
            }
        }
    }

    /// Delegates to the same writer as every other callback variant.
    pub fn log_success_event(&self, record: TrajectoryRecord) {
        self.write(&record);
    }

    /// Delegates to the same writer as every other callback variant.
    pub fn log_failure_event(&self, record: TrajectoryRecord) {
        self.write(&record);
    }

    /// Delegates to the same writer as every other callback variant.
    pub async fn async_log_success_event(&self, record: TrajectoryRecord) {
        self.write(&record);
    }

    /// Delegates to the same writer as every other callback variant.
    pub async fn async_log_failure_event(&self, record: TrajectoryRecord) {
        self.write(&record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(keyhash: &str) -> TrajectoryRecord {
        TrajectoryRecord {
            status: "success".to_string(),
            keyhash: keyhash.to_string(),
            start_time: 1_700_000_000.0,
            ..Default::default()
        }
    }

    #[test]
    fn writes_record_under_keyhash_prefix_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logger = TrajectoryLogger::new(dir.path().to_path_buf());
        logger.log_success_event(record("0123456789abcdef01230000extra"));

        let prefix_dir = dir.path().join("0123456789abcdef0123");
        assert!(prefix_dir.exists());
        let entries: Vec<_> = std::fs::read_dir(&prefix_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn failure_event_delegates_to_same_writer() {
        let dir = tempfile::tempdir().unwrap();
        let logger = TrajectoryLogger::new(dir.path().to_path_buf());
        logger.log_failure_event(record("deadbeefdeadbeefdead"));

        let prefix_dir = dir.path().join("deadbeefdeadbeefdead");
        assert!(prefix_dir.exists());
    }

    #[tokio::test]
    async fn async_variants_also_write() {
        let dir = tempfile::tempdir().unwrap();
        let logger = TrajectoryLogger::new(dir.path().to_path_buf());
        logger
            .async_log_success_event(record("aaaaaaaaaaaaaaaaaaaa"))
            .await;
        logger
            .async_log_failure_event(record("bbbbbbbbbbbbbbbbbbbb"))
            .await;

        assert!(dir.path().join("aaaaaaaaaaaaaaaaaaaa").exists());
        assert!(dir.path().join("bbbbbbbbbbbbbbbbbbbb").exists());
    }
}
