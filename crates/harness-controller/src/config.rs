//! Environment-derived configuration for the Proxy Controller Service
//! (spec §4.D, §6 "Environment variables").

use crate::error::{ControllerError, Result};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Base URL of the upstream model-proxy admin API.
    pub litellm_base_url: String,
    /// Bearer token for the upstream admin API.
    pub litellm_key: String,
    /// Max budget assigned to every newly created proxy user.
    pub global_budget: f64,
    /// Max budget assigned to every newly created proxy key.
    pub instance_budget: f64,
    pub bind_addr: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self> {
        let litellm_base_url = std::env::var("LITELLM_BASEURL")
            .map_err(|_| ControllerError::Config("LITELLM_BASEURL must be set".into()))?;
        let litellm_key = std::env::var("LITELLM_KEY")
            .map_err(|_| ControllerError::Config("LITELLM_KEY must be set".into()))?;
        let global_budget: f64 = env_or("GLOBAL_BUDGET", "100.0")
            .parse()
            .map_err(|_| ControllerError::Config("GLOBAL_BUDGET must be a number".into()))?;
        let instance_budget: f64 = env_or("INSTANCE_BUDGET", "10.0")
            .parse()
            .map_err(|_| ControllerError::Config("INSTANCE_BUDGET must be a number".into()))?;
        let bind_addr = env_or("CONTROLLER_BIND_ADDR", "127.0.0.1:4001");

        Ok(Self {
            litellm_base_url,
            litellm_key,
            global_budget,
            instance_budget,
            bind_addr,
        })
    }
}

/// The fixed safe route allowlist every proxy key is scoped to (spec §4.D):
/// the OpenAI chat/responses/embeddings/rerank surface, the Anthropic
/// messages endpoint, and the billing inspection endpoints.
pub fn safe_routes() -> Vec<&'static str> {
    vec![
        "/models",
        "/v1/models",
        "/chat/completions",
        "/v1/chat/completions",
        "/responses",
        "/v1/responses",
        "/rerank",
        "/v1/rerank",
        "/v2/rerank",
        "/embeddings",
        "/v1/embeddings",
        "/v1/messages",
        "/key/info",
        "/user/info",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_routes_includes_billing_inspection_endpoints() {
        let routes = safe_routes();
        assert!(routes.contains(&"/key/info"));
        assert!(routes.contains(&"/user/info"));
        assert_eq!(routes.len(), 14);
    }
}
