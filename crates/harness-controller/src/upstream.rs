//! Thin client over the upstream model-proxy admin API (spec §6 "Proxy
//! Controller Service", grounded in the upstream LiteLLM-compatible admin
//! surface): `user/new`, `user/delete`, `key/generate`, `key/delete`,
//! `user/info`, `key/info`.

use serde::Deserialize;
use serde_json::json;

use crate::config::{safe_routes, ControllerConfig};
use crate::error::{ControllerError, Result};

#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    admin_key: String,
    global_budget: f64,
    instance_budget: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateKeyResponse {
    key: String,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    user_info: UserInfoInner,
}

#[derive(Debug, Deserialize)]
struct UserInfoInner {
    spend: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct KeyInfoResponse {
    info: KeyInfoInner,
}

#[derive(Debug, Deserialize)]
struct KeyInfoInner {
    spend: Option<f64>,
}

impl UpstreamClient {
    pub fn new(cfg: &ControllerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: cfg.litellm_base_url.clone(),
            admin_key: cfg.litellm_key.clone(),
            global_budget: cfg.global_budget,
            instance_budget: cfg.instance_budget,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.admin_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ControllerError::Upstream(format!("{path} request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(ControllerError::Upstream(format!(
                "{path} returned status {}",
                resp.status()
            )));
        }
        Ok(resp)
    }

    /// `quota` is the user's `max_budget`, honoring the caller's requested
    /// value rather than a fixed global constant (see DESIGN.md for the
    /// resolved open question on this behavior).
    pub async fn create_user(&self, user_id: &str, user_alias: &str, quota: f64) -> Result<()> {
        self.post_json(
            "/user/new",
            json!({
                "user_id": user_id,
                "user_alias": user_alias,
                "send_invite_email": false,
                "user_role": "internal_user_viewer",
                "max_budget": quota,
                "auto_create_key": false,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        self.post_json("/user/delete", json!({ "user_ids": [user_id] }))
            .await?;
        Ok(())
    }

    pub async fn create_key(&self, user_id: &str, key_alias: &str, quota: f64) -> Result<String> {
        let resp = self
            .post_json(
                "/key/generate",
                json!({
                    "key_alias": key_alias,
                    "user_id": user_id,
                    "send_invite_email": false,
                    "max_budget": quota,
                    "max_parallel_requests": 10,
                    "allowed_routes": safe_routes(),
                }),
            )
            .await?;
        let parsed: GenerateKeyResponse = resp
            .json()
            .await
            .map_err(|e| ControllerError::Upstream(format!("key/generate malformed body: {e}")))?;
        Ok(parsed.key)
    }

    pub async fn delete_key(&self, key: &str) -> Result<()> {
        self.post_json("/key/delete", json!({ "keys": [key] }))
            .await?;
        Ok(())
    }

    pub async fn query_user_spend(&self, user_id: &str) -> Option<f64> {
        let resp = self
            .http
            .get(self.url("/user/info"))
            .bearer_auth(&self.admin_key)
            .query(&[("user_id", user_id)])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json::<UserInfoResponse>().await.ok()?.user_info.spend
    }

    pub async fn query_key_spend(&self, key: &str) -> Option<f64> {
        let resp = self
            .http
            .get(self.url("/key/info"))
            .bearer_auth(&self.admin_key)
            .query(&[("key", key)])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json::<KeyInfoResponse>().await.ok()?.info.spend
    }

    pub fn global_budget(&self) -> f64 {
        self.global_budget
    }

    pub fn instance_budget(&self) -> f64 {
        self.instance_budget
    }
}
