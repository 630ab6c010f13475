use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod assembler;
mod config;
mod dom;
mod engine;
mod error;
mod fetcher;
mod lexical;
mod model;
mod reputation;
mod routes;
mod types;
mod whois;

use config::Config;
use engine::DetectionEngine;
use model::Classifier;
use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first; the log format depends on it
    let config = Config::load()?;

    // Initialize tracing
    let json = config.logging.json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phishlens_engine=info,tower_http=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();

    info!("Loaded configuration: {:?}", config);

    // A missing or mismatched model is fatal
    let classifier = Arc::new(Classifier::load(&config.model.path)?);

    // Initialize metrics exporter
    let metrics = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    let addr: SocketAddr = config.server.bind_addr.parse()?;
    let engine = DetectionEngine::new(config, classifier)?;

    let app = routes::router(AppState {
        engine: Arc::new(engine),
        metrics,
    });

    // Start server
    info!("Starting PhishLens engine on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

    warn!("Shutdown signal received, starting graceful shutdown");
}
