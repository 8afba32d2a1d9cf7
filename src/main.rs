use anyhow::{Context, Result};
use axum::{routing::get, Router};
use futures::future::ready;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;
use tracing::info;

use winevt_deduplicator::{config::Config, service::WinevtDeduplicatorService};

pub async fn index() -> &'static str {
    "winevt deduplicator service"
}

fn setup_metrics_recorder() -> PrometheusHandle {
    const BUCKETS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 50.0, 100.0, 250.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(BUCKETS)
        .expect("failed to set metric buckets")
        .install_recorder()
        .expect("failed to install metrics recorder")
}

fn start_server(config: &Config) -> JoinHandle<()> {
    let recorder_handle = setup_metrics_recorder();
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(|| ready("ok")))
        .route(
            "/metrics",
            get(move || std::future::ready(recorder_handle.render())),
        );

    let bind = config.bind_address();

    tokio::task::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .expect("failed to bind metrics server");
        axum::serve(listener, router)
            .await
            .expect("failed to start serving metrics");
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting winevt deduplicator service");

    let mut config = Config::init_with_defaults()
        .context("Failed to load configuration from environment variables")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    config
        .apply_cli_args(&args)
        .context("Invalid command-line arguments")?;

    info!("Configuration loaded: {:?}", config);

    let server_handle = start_server(&config);
    info!("Started metrics server on {}", config.bind_address());

    let service = WinevtDeduplicatorService::new(config)
        .context("Failed to create winevt deduplicator service")?;

    // Blocks until shutdown
    service.run().await?;

    server_handle.abort();

    Ok(())
}
