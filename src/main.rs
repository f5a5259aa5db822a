use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use settlenet_serve::app_state::AppState;
use settlenet_serve::config::AppConfig;
use settlenet_serve::routes;
use settlenet_serve::services::reaper;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        models_dir = %config.models_dir.display(),
        output_dir = %config.output_dir.display(),
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Initializing settlenet-serve"
    );

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    routes::metrics::describe();

    std::fs::create_dir_all(&config.output_dir).expect("Failed to create output directory");
    if !config.models_dir.is_dir() {
        tracing::warn!(
            models_dir = %config.models_dir.display(),
            "Models directory does not exist, every job will fail until it is created"
        );
    }

    let bind_addr = config.bind_addr.clone();
    let ttl = Duration::from_secs(config.job_ttl_secs);
    let reaper_interval = Duration::from_secs(config.reaper_interval_secs.max(1));
    let state = AppState::new(config);

    let shutdown = CancellationToken::new();
    if !ttl.is_zero() {
        tokio::spawn(reaper::run(
            state.jobs.clone(),
            ttl,
            reaper_interval,
            shutdown.clone(),
        ));
    }

    let app = routes::router(state).merge(routes::metrics::router(Arc::new(prometheus_handle)));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("Server error");
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
