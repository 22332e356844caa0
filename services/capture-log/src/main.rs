use anyhow::{Context, Result};
use capture_log::{start_api_server, AppState, Config, OutputDirs};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Nier Capture Log Service"
    );

    if config.service.metrics_enabled {
        init_metrics(config.service.metrics_port)?;
    }

    // Output directories must exist before the first request is accepted
    let dirs = OutputDirs::provision(&config.storage)
        .context("Failed to provision output directories")?;

    let state = AppState::new(config.service.name.clone(), &dirs);

    let api_config = config.api.clone();
    let storage_config = config.storage.clone();
    let mut api_handle = tokio::spawn(async move {
        start_api_server(state, &api_config, &storage_config).await
    });

    info!(address = %config.listen_addr(), "Capture log service started");

    let server_exit = tokio::select! {
        result = &mut api_handle => Some(result),
        _ = shutdown_signal() => None,
    };

    match server_exit {
        Some(Ok(Ok(()))) => info!("API server exited"),
        Some(Ok(Err(e))) => {
            error!(error = %e, "API server error");
            return Err(e);
        }
        Some(Err(e)) => return Err(e).context("API server task panicked"),
        None => {
            info!("Shutting down capture log service");
            api_handle.abort();
        }
    }

    info!("Capture log service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
