pub mod agent_cell;
pub mod candidate;
pub mod candidate_driver;
pub mod catalog;
pub mod config;
pub mod docker;
pub mod error;
pub mod platform;
pub mod preflight;
pub mod project_worker;
pub mod proxy_client;
pub mod runner;
pub mod sandbox;
pub mod workdir;

pub use error::{HarnessError, Result};

use tracing::info;

/// Initialise a default tracing subscriber for the binary consumer.
///
/// Call this once at program start. Uses `RUST_LOG` env var for filtering,
/// defaulting to `info` level.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).init();

    info!("harness tracing initialised");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = HarnessError::Config("missing field".into());
        assert_eq!(err.to_string(), "config error: missing field");
    }
}
