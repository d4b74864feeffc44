//! feedsift server binary

use anyhow::{Context, Result};
use clap::Parser;
use feedsift_server::cli::{Cli, Commands, ServeArgs};
use feedsift_server::{create_router, AppState, ServerConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::CheckConfig { config } => check_config(&config),
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    info!("Starting feedsift server");

    let mut config = ServerConfig::load(&args.config)?;
    config.apply_overrides(&args);
    config
        .validate()
        .with_context(|| format!("refusing to start with {}", args.config))?;
    info!(
        sources = config.sources.len(),
        classifier = %config.classifier.endpoint,
        model = %config.classifier.model,
        "Configuration loaded"
    );

    let metrics_handle = init_metrics()?;
    let state = AppState::new(config, Some(metrics_handle))?;
    state.scheduler.spawn();

    let addr = state.config.listen.socket_addr()?;
    let app = create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    info!("Listening on http://{}", addr);

    let shutdown_state = state.clone();
    let shutdown = async move {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping pipeline...");
        shutdown_state.shutdown().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn check_config(path: &str) -> Result<()> {
    let config = ServerConfig::load(path)?;
    match config.validate() {
        Ok(()) => {
            println!(
                "{}: OK ({} sources, classifier {})",
                path,
                config.sources.len(),
                config.classifier.model
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "configuration rejected");
            Err(e).with_context(|| format!("{} is invalid", path))
        }
    }
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("feedsift=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feedsift=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;
    feedsift_telemetry::describe_metrics();

    info!("Metrics exporter initialized");
    Ok(handle)
}
