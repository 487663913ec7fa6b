mod autopilot;
mod command;
mod config;
mod session;
mod vehicle;

use anyhow::Context;
use autopilot::MavlinkVehicle;
use clap::Parser;
use config::{Cli, RelayConfig};
use session::Listener;
use std::sync::Arc;
use vehicle::VehicleHandle;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RelayConfig::from(Cli::parse());

    info!("Telemetry relay starting");
    info!("  Autopilot link: {}", config.vehicle.connection);
    info!("  Client framing: {}", config.framing);
    info!("  Idle timeout: {:?}", config.idle_timeout);

    let vehicle = MavlinkVehicle::connect(config.vehicle.clone())
        .await
        .context("failed to connect to the autopilot")?;
    let vehicle: VehicleHandle = Arc::new(vehicle);
    info!("Vehicle connected via {}", vehicle.name());

    if config.wait_for_fix {
        info!("Waiting for position fix...");
        vehicle
            .wait_for_position_fix()
            .await
            .context("vehicle never reported a position fix")?;
        info!("Position fix acquired");
    } else {
        warn!("Serving clients without a position fix");
    }

    let addr = config.listen_addr();
    let listener = Listener::bind(&addr, vehicle, config.session())
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening for ground clients on {}", listener.local_addr()?);

    listener
        .serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Relay stopped");
    Ok(())
}
