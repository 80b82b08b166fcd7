//! transit-sim - scripted end-to-end run of the transit core
//!
//! Drives one coordinator through the interesting arbitration cases
//! against a logging device: a clean arrival, an externally-confirmed
//! ramp shot, a ball that times out, and a stray detection with nothing
//! pending. Useful for eyeballing the log output of the real task
//! wiring without pinball hardware.
//!
//! Module structure:
//! - `domain/` - Core types (DeviceId, TransitState, errors)
//! - `io/` - External signal sources (Switchboard)
//! - `services/` - Business logic (TransitRecord, TransitCoordinator)
//! - `infra/` - Infrastructure (Config, Signal, Metrics)

use async_trait::async_trait;
use ball_transit::domain::DeviceId;
use ball_transit::infra::{Config, Metrics};
use ball_transit::io::Switchboard;
use ball_transit::services::{DeviceHandler, TransitCoordinator, TransitRecord};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Transit simulation - scripted ball movements through one device
#[derive(Parser, Debug)]
#[command(name = "transit-sim", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/machine.toml")]
    config: String,
}

/// Device stub that logs every notification from the core
struct LoggingDevice {
    name: DeviceId,
}

#[async_trait]
impl DeviceHandler for LoggingDevice {
    async fn expected_ball_received(&self) {
        info!(device = %self.name, "device_expected_ball_received");
    }

    async fn unexpected_ball_received(&self) {
        info!(device = %self.name, "device_unexpected_ball_received");
    }

    async fn lost_incoming_ball(&self, source: DeviceId) {
        info!(device = %self.name, source = %source, "device_lost_incoming_ball");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG
    // env var. Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("transit-sim starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        machine = %config.machine_name(),
        "config_loaded"
    );

    let trough = DeviceId::new("trough");
    let plunger_lane = DeviceId::new("plunger_lane");
    let playfield = DeviceId::new("playfield");

    let switchboard = Arc::new(Switchboard::new());
    let metrics = Arc::new(Metrics::new());
    let device = Arc::new(LoggingDevice { name: playfield.clone() });
    let coordinator = TransitCoordinator::new(
        playfield.clone(),
        Arc::clone(&device) as Arc<dyn DeviceHandler>,
        Arc::clone(&metrics),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher = tokio::spawn(Arc::clone(&coordinator).run(shutdown_rx));

    // Ball 1: clean eject from the trough, detected in time
    let ball1 = TransitRecord::new(
        trough.clone(),
        playfield.clone(),
        config.ball_missing_timeout(&trough, &playfield),
    );
    coordinator.register(&ball1);
    ball1.arm_timeout(config.transit_timeout(&playfield));
    sleep(Duration::from_millis(50)).await;
    let outcome = coordinator.on_physical_arrival().await;
    info!(ball = 1, outcome = %outcome.as_str(), "arbitrated");

    // Ball 2: plunger eject that needs the ramp switch before the
    // detection may be attributed to it
    let ball2 = TransitRecord::new(
        plunger_lane.clone(),
        playfield.clone(),
        config.ball_missing_timeout(&plunger_lane, &playfield),
    );
    ball2.attach_confirm_switch(&switchboard, "s_ramp_made")?;
    coordinator.register(&ball2);
    ball2.arm_timeout(config.transit_timeout(&playfield));
    switchboard.post_switch("s_ramp_made");
    sleep(Duration::from_millis(50)).await;
    let outcome = coordinator.on_physical_arrival().await;
    info!(ball = 2, outcome = %outcome.as_str(), "arbitrated");

    // Ball 3: never shows up; the watcher reports it lost
    let ball3 = TransitRecord::new(
        trough.clone(),
        playfield.clone(),
        config.ball_missing_timeout(&trough, &playfield),
    );
    coordinator.register(&ball3);
    ball3.arm_timeout(Duration::from_millis(200));
    sleep(Duration::from_millis(400)).await;
    info!(ball = 3, timed_out = %ball3.is_timed_out(), "arbitrated");

    // Stray detection with nothing pending
    let outcome = coordinator.on_physical_arrival().await;
    info!(ball = 4, outcome = %outcome.as_str(), "arbitrated");

    metrics.log_summary();

    shutdown_tx.send(true)?;
    watcher.await?;

    info!("transit-sim finished");
    Ok(())
}
