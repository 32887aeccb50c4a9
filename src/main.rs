//! Parking gate - unattended access control for a parking facility
//!
//! Consumes plate and tag recognition events, decides entry/exit against the
//! occupancy registry, cycles the gates, and keeps the free-slot display
//! current.
//!
//! Module structure:
//! - `domain/` - Core types (Identity, Decision, error taxonomy)
//! - `io/` - Collaborator traits, SQLite store, audit trail, simulator drivers
//! - `services/` - Normalizer, registry, gates, display, access orchestration
//! - `infra/` - Infrastructure (Config, Metrics)
//!
//! Physical drivers are external; this binary drives the in-memory drivers
//! from stdin (`plate <text>`, `tag <id>`, `sensors <n>`).

use anyhow::Context;
use clap::Parser;
use parking_gate::infra::{Config, Metrics};
use parking_gate::io::console::{run_console_feed, ConsoleFeed};
use parking_gate::io::sim::{
    QueuedCamera, QueuedTagReader, RecordingActuator, RecordingDisplay, SharedSensorArray,
    TextRecognizer,
};
use parking_gate::io::{AccessAudit, SqliteStore};
use parking_gate::services::workers::{
    run_metrics_reporter, run_plate_loop, run_sensor_loop, run_tag_loop, shutdown_safely,
};
use parking_gate::services::{
    AccessController, DisplayCoordinator, GateController, Normalizer, OccupancyRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Parking gate - unattended entry/exit access control
#[derive(Parser, Debug)]
#[command(name = "parking-gate", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let result = runtime.block_on(run());
    // A pending stdin read holds a blocking thread that never returns on its own
    runtime.shutdown_timeout(Duration::from_millis(500));
    result
}

async fn run() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::new(Rfc3339))
        .with_target(false);

    // LOG_FORMAT=json for log shipping on the site controller
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(git_hash = %env!("GIT_HASH"), "parking-gate starting");

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        registry_path = %config.registry_path(),
        plate_pattern = %config.plate_pattern(),
        camera_channel = %config.camera_channel().as_str(),
        tag_channel = %config.tag_channel().as_str(),
        sensor_pins = ?config.sensor_pins(),
        gate_dwell_secs = %config.gate_dwell_secs(),
        audit_enabled = %config.audit_enabled(),
        "config_loaded"
    );

    let normalizer = Normalizer::new(config.plate_pattern())
        .with_context(|| format!("invalid plate pattern {:?}", config.plate_pattern()))?;
    let store = SqliteStore::open(config.registry_path())
        .with_context(|| format!("failed to open registry {}", config.registry_path()))?;

    let metrics = Arc::new(Metrics::new());
    let registry = Arc::new(OccupancyRegistry::new(Arc::new(store)));

    // Simulator drivers fed from the console
    let (plate_tx, camera) = QueuedCamera::new(64);
    let (tag_tx, tag_reader) = QueuedTagReader::new(64);
    let sensors = Arc::new(SharedSensorArray::new(config.sensor_pins().len() as u32));
    let actuator = Arc::new(RecordingActuator::new());
    let display_driver = Arc::new(RecordingDisplay::new());

    let gates = Arc::new(GateController::new(
        &config.gates(),
        Duration::from_secs(config.gate_dwell_secs()),
        actuator,
        metrics.clone(),
    ));
    let display = Arc::new(DisplayCoordinator::new(
        display_driver,
        config.display_cols(),
        config.display_rows(),
        metrics.clone(),
    ));

    let mut access = AccessController::new(
        &config,
        normalizer,
        registry,
        gates.clone(),
        display.clone(),
        metrics.clone(),
    );
    if config.audit_enabled() {
        access = access.with_audit(Arc::new(AccessAudit::new(config.audit_file())));
    }
    let access = Arc::new(access);

    shutdown_safely(&gates, &display).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();

    workers.push(tokio::spawn(run_sensor_loop(
        sensors.clone(),
        display.clone(),
        metrics.clone(),
        Duration::from_millis(config.sensor_poll_interval_ms()),
        shutdown_rx.clone(),
    )));
    workers.push(tokio::spawn(run_tag_loop(
        Arc::new(tag_reader),
        access.clone(),
        config.tag_channel(),
        Duration::from_millis(config.tag_poll_interval_ms()),
        shutdown_rx.clone(),
    )));
    workers.push(tokio::spawn(run_plate_loop(
        Arc::new(camera),
        Arc::new(TextRecognizer),
        access,
        config.camera_channel(),
        Duration::from_millis(config.plate_poll_interval_ms()),
        shutdown_rx.clone(),
    )));
    workers.push(tokio::spawn(run_metrics_reporter(
        metrics,
        Duration::from_secs(config.metrics_interval_secs()),
        shutdown_rx.clone(),
    )));

    // Console feed is not joined: it stops on shutdown or at EOF
    let feed = ConsoleFeed { plate_tx, tag_tx, sensors };
    tokio::spawn(run_console_feed(BufReader::new(tokio::io::stdin()), feed, shutdown_rx));

    info!("workers_started");

    if let Err(e) = wait_for_shutdown_signal().await {
        error!(error = %e, "signal_handler_failed");
    }
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);

    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "worker_join_failed");
        }
    }

    shutdown_safely(&gates, &display).await;
    info!("parking-gate shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
