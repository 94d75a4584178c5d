//! Proxy Control Client (spec §4.C): a thin HTTP client against the Proxy
//! Controller Service. All six operations are plain GETs.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{HarnessError, Result};

/// Response shape common to every harness route: `{error: null, ...}` on
/// success.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Deserialize)]
struct Empty {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedKey {
    pub key: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub user_usage: Option<f64>,
    pub key_usage: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthReport {
    pub compat: Vec<String>,
}

/// HTTP client for the Proxy Controller Service.
#[derive(Clone)]
pub struct ProxyControlClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ProxyControlClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    async fn get_envelope<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let mut url = self.base_url.clone();
        url.set_path(path);
        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| HarnessError::Proxy(format!("{path} request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(HarnessError::Proxy(format!(
                "{path} returned status {}",
                resp.status()
            )));
        }

        let envelope: Envelope<T> = resp
            .json()
            .await
            .map_err(|e| HarnessError::Proxy(format!("{path} returned malformed body: {e}")))?;

        if let Some(err) = envelope.error {
            return Err(HarnessError::Proxy(format!("{path} reported error: {err}")));
        }
        Ok(envelope.body)
    }

    /// Create a proxy user with the given total quota. Failures are fatal
    /// to the enclosing scope.
    pub async fn create_user(&self, user_id: &str, quota: f64) -> Result<()> {
        let quota_str = quota.to_string();
        self.get_envelope::<Empty>(
            "/harness/create_user",
            &[("user_id", user_id), ("user_alias", user_id), ("quota", &quota_str)],
        )
        .await?;
        Ok(())
    }

    /// Delete a proxy user. Failures are logged by the caller and swallowed.
    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        self.get_envelope::<Empty>("/harness/delete_user", &[("user_id", user_id)])
            .await?;
        Ok(())
    }

    /// Create a proxy key scoped to `user_id` with the given instance quota.
    pub async fn create_key(&self, user_id: &str, key_alias: &str, quota: f64) -> Result<CreatedKey> {
        let quota_str = quota.to_string();
        self.get_envelope::<CreatedKey>(
            "/harness/create_key",
            &[
                ("user_id", user_id),
                ("key_alias", key_alias),
                ("quota", &quota_str),
            ],
        )
        .await
    }

    /// Delete a proxy key. Failures are logged by the caller and swallowed.
    pub async fn delete_key(&self, key: &str) -> Result<()> {
        self.get_envelope::<Empty>("/harness/delete_key", &[("key", key)])
            .await?;
        Ok(())
    }

    /// Query remaining balance for a user/key pair. Either field may be
    /// `None` if the upstream query for that field failed.
    pub async fn query_balance(&self, user_id: &str, key: &str) -> Result<Balance> {
        self.get_envelope::<Balance>(
            "/harness/query_balance",
            &[("user_id", user_id), ("key", key)],
        )
        .await
    }

    /// Health-check the controller. Preflight requires `"v1"` to be among
    /// the reported compatibility tags.
    pub async fn health(&self) -> Result<HealthReport> {
        let mut url = self.base_url.clone();
        url.set_path("/harness/health");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| HarnessError::Proxy(format!("health check failed: {e}")))?;
        resp.json()
            .await
            .map_err(|e| HarnessError::Proxy(format!("health check returned malformed body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_key_round_trips_json() {
        let created = CreatedKey {
            key: "sk-abc".into(),
            hash: "deadbeef".into(),
        };
        let json = serde_json::to_string(&created).unwrap();
        let back: CreatedKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back.key, "sk-abc");
    }

    #[test]
    fn balance_allows_null_fields() {
        let json = r#"{"user_usage": null, "key_usage": 1.5}"#;
        let balance: Balance = serde_json::from_str(json).unwrap();
        assert!(balance.user_usage.is_none());
        assert_eq!(balance.key_usage, Some(1.5));
    }
}
