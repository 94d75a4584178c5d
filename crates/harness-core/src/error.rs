use thiserror::Error;

/// Top-level error type for the harness-core library.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Configuration parse or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Benchmark catalog lookup or load error.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Proxy control client error (create/delete user or key, query, health).
    #[error("proxy error: {0}")]
    Proxy(String),

    /// Docker container lifecycle error.
    #[error("docker error: {0}")]
    Docker(String),

    /// Workdir acquisition error.
    #[error("workdir error: {0}")]
    Workdir(String),

    /// Result-tree artifact read/write error.
    #[error("artifact error: {0}")]
    Artifact(String),

    /// Wraps `std::io::Error`.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bollard::errors::Error> for HarnessError {
    fn from(err: bollard::errors::Error) -> Self {
        HarnessError::Docker(err.to_string())
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, HarnessError>;
