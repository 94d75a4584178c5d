//! Environment-derived runtime configuration.
//!
//! The original harness reads its tunables from module-level environment
//! lookups scattered across the entry point. Here they are collected once,
//! validated, and threaded through explicitly instead of living as globals.

use std::path::PathBuf;

use url::Url;

use crate::error::{HarnessError, Result};
use crate::platform::owner::Owner;

/// Runtime configuration resolved once at process start.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// 0 = silent, 1 = summary lines, 2 = mirror agent container logs to stdout.
    pub verbose: u8,
    /// Username that result-tree files are re-owned to after an instance finishes.
    pub file_owner: String,
    /// Resolved uid/gid for `file_owner`.
    pub owner: Owner,
    /// Block device the resource envelope's IO throttling applies to.
    pub rootfs_device: PathBuf,
    /// Prefix every derived sandbox image tag is appended to.
    pub docker_image_base: String,
    /// Root directory the proxy writes trajectory records under.
    pub litellm_traj_dir: PathBuf,
    /// Host directory containing the sandbox container's entrypoint scripts.
    pub sshbox_script_path: PathBuf,
    /// Root of the `results/<run_name>/<ident>` tree.
    pub result_root: PathBuf,
    /// Root of scratch working directories (`workdir/<stem>--<rand>`).
    pub work_root: PathBuf,
    /// Base URL of the Proxy Controller Service, reachable from the host.
    pub controller_base_url: Url,
    /// Base URL of the model proxy as seen from inside the `infra` network.
    pub proxy_base_url_in_docker: Url,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl HarnessConfig {
    /// Build configuration from the process environment, applying the same
    /// defaults as the original harness and failing fast on anything that
    /// can't be resolved (a bad `FILE_OWNER`, an unparseable `VERBOSE`).
    pub fn from_env() -> Result<Self> {
        let verbose: u8 = env_or("VERBOSE", "2")
            .parse()
            .map_err(|_| HarnessError::Config("VERBOSE must be an integer 0-2".into()))?;
        if verbose > 2 {
            return Err(HarnessError::Config("VERBOSE must be 0, 1, or 2".into()));
        }

        let file_owner = env_or("FILE_OWNER", "root");
        let owner = Owner::resolve(&file_owner)
            .map_err(|e| HarnessError::Config(format!("FILE_OWNER {file_owner:?}: {e}")))?;

        let rootfs_device = PathBuf::from(env_or("ROOTFS_DEVICE", "/dev/sda"));
        let docker_image_base = std::env::var("DOCKER_IMAGE_BASE")
            .map_err(|_| HarnessError::Config("DOCKER_IMAGE_BASE must be set".into()))?;
        let litellm_traj_dir = PathBuf::from(env_or("LITELLM_TRAJ_DIR", "../play/trajs"));
        let sshbox_script_path = PathBuf::from(env_or(
            "SSHBOX_SCRIPT_PATH",
            "../sshbox_scripts",
        ));
        let result_root = PathBuf::from(env_or("RESULT_PATH", "results"));
        let work_root = PathBuf::from(env_or("WORK_PATH", "workdir"));

        let controller_base_url = Url::parse(&env_or(
            "LITELLM_CONTROLLER_BASEURL",
            "http://127.0.0.1:4001",
        ))
        .map_err(|e| HarnessError::Config(format!("LITELLM_CONTROLLER_BASEURL: {e}")))?;
        let proxy_base_url_in_docker = Url::parse(&env_or(
            "LITELLM_BASEURL_IN_DOCKER",
            "http://litellm_app:4000",
        ))
        .map_err(|e| HarnessError::Config(format!("LITELLM_BASEURL_IN_DOCKER: {e}")))?;

        Ok(Self {
            verbose,
            file_owner,
            owner,
            rootfs_device,
            docker_image_base,
            litellm_traj_dir,
            sshbox_script_path,
            result_root,
            work_root,
            controller_base_url,
            proxy_base_url_in_docker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn rejects_out_of_range_verbose() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("VERBOSE", "9");
        std::env::set_var("DOCKER_IMAGE_BASE", "example.registry/repair");
        let result = HarnessConfig::from_env();
        std::env::remove_var("VERBOSE");
        std::env::remove_var("DOCKER_IMAGE_BASE");
        assert!(result.is_err());
    }

    #[test]
    fn requires_docker_image_base() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("DOCKER_IMAGE_BASE");
        let result = HarnessConfig::from_env();
        assert!(result.is_err());
    }

    #[test]
    fn defaults_fill_in_missing_optional_vars() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DOCKER_IMAGE_BASE", "example.registry/repair");
        std::env::remove_var("VERBOSE");
        std::env::remove_var("ROOTFS_DEVICE");
        let cfg = HarnessConfig::from_env().expect("should build with defaults");
        assert_eq!(cfg.verbose, 2);
        assert_eq!(cfg.rootfs_device, PathBuf::from("/dev/sda"));
        std::env::remove_var("DOCKER_IMAGE_BASE");
    }
}
