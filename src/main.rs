use tokio::net::TcpListener;
use tracing::{info, warn};
use videosnap::{
    backend::{self, local},
    config::{BackendKind, RelayConfig},
    error::ApiError,
    routes::{AppState, build_router},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "videosnap=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let config = RelayConfig::from_env()?;

    if config.uses_default_api_key() {
        warn!("API_KEY is not set. The default placeholder key is in use; set API_KEY before exposing this server.");
    }

    if config.backend == BackendKind::Local {
        tokio::fs::create_dir_all(&config.transfer_dir)
            .await
            .map_err(|error| {
                ApiError::internal(format!(
                    "Could not create transfer directory {:?}: {error}",
                    config.transfer_dir
                ))
            })?;
        local::sweep_stale_jobs(&config.transfer_dir, local::STALE_JOB_SECONDS).await;
    }

    let extractor = backend::from_config(&config)?;
    info!("Using {} extraction backend", extractor.name());

    let app = build_router(AppState::new(&config, extractor), &config.allowed_origins);

    let listener = TcpListener::bind(&config.bind_addr).await.map_err(|error| {
        ApiError::internal(format!("Could not bind {}: {error}", config.bind_addr))
    })?;

    info!("Relay listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {error}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
