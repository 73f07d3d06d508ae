//! loadgated — the load gate daemon.
//!
//! Single binary that assembles the whole gate:
//! - Metrics recorder (sliding window)
//! - Load evaluator
//! - Degradation controller
//! - Scaling advisor
//! - HTTP API with the admission middleware in front
//!
//! # Usage
//!
//! ```text
//! loadgated serve --port 8080 --config /etc/loadgate/gate.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use loadgate_advisor::ScalingAdvisor;
use loadgate_api::GateState;
use loadgate_control::{DegradationController, LoadEvaluator};
use loadgate_core::GateConfig;
use loadgate_metrics::MetricsRecorder;

#[derive(Parser)]
#[command(name = "loadgated", about = "Load gate daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gate and its HTTP API.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Background refresh interval for the controller, in seconds.
        #[arg(long, default_value = "1")]
        refresh_interval: u64,

        /// Advisory cycle interval in seconds.
        #[arg(long, default_value = "30")]
        advisor_interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,loadgated=debug,loadgate=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            config,
            refresh_interval,
            advisor_interval,
        } => run_serve(port, config, refresh_interval, advisor_interval).await,
    }
}

async fn run_serve(
    port: u16,
    config_path: Option<PathBuf>,
    refresh_interval: u64,
    advisor_interval: u64,
) -> anyhow::Result<()> {
    info!("load gate daemon starting");

    // A broken config file is fatal; a missing one means defaults.
    let mut config = match &config_path {
        Some(path) => {
            let config = GateConfig::load(path)?;
            info!(path = ?path, "configuration loaded");
            config
        }
        None => {
            let config = GateConfig::default();
            config.validate()?;
            config
        }
    };

    // The gate's own control plane must stay reachable while shedding.
    for endpoint in ["/api/v1/health", "/metrics"] {
        if !config
            .degradation
            .essential_endpoints
            .iter()
            .any(|e| e == endpoint)
        {
            config
                .degradation
                .essential_endpoints
                .push(endpoint.to_string());
        }
    }

    // ── Initialize subsystems ──────────────────────────────────

    let recorder = Arc::new(MetricsRecorder::new(&config.window));
    info!(
        bucket_secs = config.window.bucket_secs,
        bucket_count = config.window.bucket_count,
        "metrics recorder initialized"
    );

    let evaluator = Arc::new(LoadEvaluator::new(
        recorder.clone(),
        config.evaluator.clone(),
    ));
    info!("load evaluator initialized");

    let controller = Arc::new(DegradationController::new(
        evaluator.clone(),
        config.degradation.clone(),
    ));
    info!("degradation controller initialized");

    let advisor = Arc::new(ScalingAdvisor::new(
        evaluator.clone(),
        config.advisor.clone(),
    ));
    info!(interval = advisor_interval, "scaling advisor initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let controller_shutdown = shutdown_rx.clone();
    let advisor_shutdown = shutdown_rx.clone();

    // ── Start background tasks ─────────────────────────────────

    let controller_task = controller.clone();
    let controller_handle = tokio::spawn(async move {
        controller_task
            .run(Duration::from_secs(refresh_interval), controller_shutdown)
            .await;
    });

    let advisor_task = advisor.clone();
    let advisor_handle = tokio::spawn(async move {
        advisor_task
            .run(Duration::from_secs(advisor_interval), advisor_shutdown)
            .await;
    });

    // ── Start API server ───────────────────────────────────────

    let state = GateState {
        controller,
        advisor,
        recorder,
    };
    let router = loadgate_api::apply_gate(loadgate_api::build_router(state.clone()), state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = controller_handle.await;
    let _ = advisor_handle.await;

    info!("load gate daemon stopped");
    Ok(())
}
