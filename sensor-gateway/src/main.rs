//! Sensor Gateway - forwards roadside sensor readings to the backend
//!
//! Reads `Vehicles:<n>,Air:<aqi>` lines from a serial device (or the built-in
//! simulator), parses them and POSTs each reading to the backend as JSON.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `GATEWAY_SOURCE`: `serial` or `simulated` (default: serial)
//! - `GATEWAY_SERIAL_PORT`: device address (default: /dev/ttyUSB0)
//! - `GATEWAY_BAUD_RATE`: baud rate (default: 9600)
//! - `GATEWAY_BACKEND_URL`: endpoint (default: http://localhost:3000/api/updateSensor)
//! - `GATEWAY_LOCATION_ID`: deployment location (default: 9)
//! - `GATEWAY_OPEN_POLICY`: `fail-fast` or `retry` (default: fail-fast)
//! - `RUST_LOG`: Logging level filter (default: info)
//!
//! See `Config::from_env` for the full list.

use std::future::Future;
use std::io;
use std::process::ExitCode;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sensor_gateway::client::DeliveryClient;
use sensor_gateway::config::Config;
use sensor_gateway::gateway::{Gateway, GatewaySettings};
use sensor_gateway::line_source::{LineSource, SourceKind};
use sensor_gateway::parser::RecordParser;
use sensor_gateway::serial::SerialLineSource;
use sensor_gateway::simulator::{SimulatedLineSource, SimulatorConfig};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    init_tracing();

    info!("Starting Sensor Gateway...");

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                source = %config.source,
                serial_port = %config.serial_port,
                baud_rate = config.baud_rate,
                backend_url = %config.backend_url,
                location_id = config.location_id,
                open_policy = ?config.open_policy,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    // Create HTTP client with connection pooling
    let client = match DeliveryClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to create HTTP client");
            return ExitCode::FAILURE;
        }
    };

    // Wire Ctrl+C to the shutdown channel
    let (stop_tx, shutdown) = watch::channel(false);
    tokio::spawn(forward_shutdown(tokio::signal::ctrl_c(), stop_tx));

    // Select the line source and run until stopped
    match config.source {
        SourceKind::Serial => {
            let source = SerialLineSource::new(config.serial_port.clone(), config.baud_rate);
            run_gateway(source, client, &config, shutdown).await
        }
        SourceKind::Simulated => {
            let source = SimulatedLineSource::new(
                SimulatorConfig::default().with_interval(config.sim_interval),
            );
            run_gateway(source, client, &config, shutdown).await
        }
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Request a stop once `signal` fires.
///
/// If the signal cannot be installed the gateway keeps running; it can then
/// only be stopped externally.
async fn forward_shutdown<F>(signal: F, stop_tx: watch::Sender<bool>)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Shutdown signal received, stopping...");
            let _ = stop_tx.send(true);
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal, continuing without it");
        }
    }
}

/// Drive the gateway to completion and map the outcome to an exit code.
async fn run_gateway<S: LineSource>(
    source: S,
    client: DeliveryClient,
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> ExitCode {
    let mut gateway = Gateway::new(
        source,
        client,
        RecordParser::new(config.location_id),
        GatewaySettings::from(config),
    );

    match gateway.run(shutdown).await {
        Ok(_) => {
            info!("Sensor Gateway stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Ensure the device is connected and the port is correct");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_requests_stop() {
        let (stop_tx, shutdown) = watch::channel(false);
        forward_shutdown(async { Ok(()) }, stop_tx).await;
        assert!(*shutdown.borrow());
    }

    #[tokio::test]
    async fn test_signal_failure_does_not_stop() {
        let (stop_tx, shutdown) = watch::channel(false);
        forward_shutdown(
            async { Err(io::Error::new(io::ErrorKind::Other, "no signal handler")) },
            stop_tx,
        )
        .await;
        assert!(!*shutdown.borrow());
    }
}
