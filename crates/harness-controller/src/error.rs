use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Top-level error type for the controller service.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("config error: {0}")]
    Config(String),

    /// The upstream model-proxy admin API returned a non-2xx response or
    /// could not be reached at all.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Every harness route returns `{error: null, ...}` on success; on
/// failure it returns a JSON body with a non-null `error` field and a 502
/// (the upstream call failed) since the harness itself never rejects a
/// well-formed request.
impl IntoResponse for ControllerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ControllerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ControllerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ControllerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
