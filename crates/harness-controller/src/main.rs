//! Proxy Controller Service entrypoint (spec §4.D): an axum service that
//! sits between the harness and the upstream model proxy's admin API.

mod config;
mod error;
mod keyhash;
mod routes;
mod trajectory;
mod upstream;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::ControllerConfig;
use routes::AppState;
use upstream::UpstreamClient;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harness_controller=info,tower_http=info".into()),
        )
        .init();

    let cfg = ControllerConfig::from_env().expect("invalid controller configuration");
    tracing::info!(bind_addr = %cfg.bind_addr, upstream = %cfg.litellm_base_url, "starting proxy controller");

    let upstream = Arc::new(UpstreamClient::new(&cfg));
    let state = AppState { upstream };

    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", cfg.bind_addr));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("proxy controller server failed");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
