//! Proxy Controller Service HTTP routes (spec §6 "Proxy Controller HTTP"):
//! six GET endpoints, all returning `{error: null, ...}` on success.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Result;
use crate::keyhash::calc_keyhash;
use crate::upstream::UpstreamClient;

#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/harness/health", get(health))
        .route("/harness/create_user", get(create_user))
        .route("/harness/delete_user", get(delete_user))
        .route("/harness/create_key", get(create_key))
        .route("/harness/delete_key", get(delete_key))
        .route("/harness/query_balance", get(query_balance))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "error": null, "compat": ["v1"] }))
}

#[derive(Debug, Deserialize)]
struct CreateUserParams {
    user_id: String,
    user_alias: String,
    quota: f64,
}

async fn create_user(
    State(state): State<AppState>,
    Query(params): Query<CreateUserParams>,
) -> Result<Json<serde_json::Value>> {
    state
        .upstream
        .create_user(&params.user_id, &params.user_alias, params.quota)
        .await?;
    Ok(Json(json!({ "error": null })))
}

#[derive(Debug, Deserialize)]
struct DeleteUserParams {
    user_id: String,
}

async fn delete_user(
    State(state): State<AppState>,
    Query(params): Query<DeleteUserParams>,
) -> Result<Json<serde_json::Value>> {
    state.upstream.delete_user(&params.user_id).await?;
    Ok(Json(json!({ "error": null })))
}

#[derive(Debug, Deserialize)]
struct CreateKeyParams {
    user_id: String,
    key_alias: String,
    quota: f64,
}

#[derive(Debug, Serialize)]
struct CreateKeyResponse {
    error: Option<String>,
    key: String,
    hash: String,
}

async fn create_key(
    State(state): State<AppState>,
    Query(params): Query<CreateKeyParams>,
) -> Result<Json<CreateKeyResponse>> {
    let key = state
        .upstream
        .create_key(&params.user_id, &params.key_alias, params.quota)
        .await?;
    let hash = calc_keyhash(&key)?;
    Ok(Json(CreateKeyResponse {
        error: None,
        key,
        hash,
    }))
}

#[derive(Debug, Deserialize)]
struct DeleteKeyParams {
    key: String,
}

async fn delete_key(
    State(state): State<AppState>,
    Query(params): Query<DeleteKeyParams>,
) -> Result<Json<serde_json::Value>> {
    state.upstream.delete_key(&params.key).await?;
    Ok(Json(json!({ "error": null })))
}

#[derive(Debug, Deserialize)]
struct QueryBalanceParams {
    user_id: String,
    key: String,
}

#[derive(Debug, Serialize)]
struct QueryBalanceResponse {
    error: Option<String>,
    user_usage: Option<f64>,
    key_usage: Option<f64>,
}

/// Queries `user/info` and `key/info` independently; either may fail
/// without failing the whole call (spec §4.C: "either field may be null
/// on query failure").
async fn query_balance(
    State(state): State<AppState>,
    Query(params): Query<QueryBalanceParams>,
) -> Json<QueryBalanceResponse> {
    let user_usage = state.upstream.query_user_spend(&params.user_id).await;
    let key_usage = state.upstream.query_key_spend(&params.key).await;
    Json(QueryBalanceResponse {
        error: None,
        user_usage,
        key_usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_v1_compat() {
        let Json(body) = health().await;
        let compat = body["compat"].as_array().unwrap();
        assert!(compat.iter().any(|v| v == "v1"));
        assert!(body["error"].is_null());
    }
}
