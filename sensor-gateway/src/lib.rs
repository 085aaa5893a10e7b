//! Sensor Gateway Library
//!
//! Bridges a roadside sensor unit to the backend REST API:
//!
//! - **line_source**: the `LineSource` capability shared by all input variants
//! - **serial**: line source over a physical serial device
//! - **simulator**: synthetic line source for running without hardware
//! - **parser**: device line format to `SensorReading`
//! - **client**: HTTP delivery of readings to the backend
//! - **gateway**: the polling loop with reconnect and shutdown handling
//! - **config**: environment-based configuration
//!
//! # Example
//!
//! ```no_run
//! use sensor_gateway::client::DeliveryClient;
//! use sensor_gateway::config::Config;
//! use sensor_gateway::gateway::{Gateway, GatewaySettings};
//! use sensor_gateway::parser::RecordParser;
//! use sensor_gateway::simulator::{SimulatedLineSource, SimulatorConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let client = DeliveryClient::new(&config).expect("Failed to create client");
//!     let source = SimulatedLineSource::new(
//!         SimulatorConfig::default().with_interval(config.sim_interval),
//!     );
//!
//!     let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!     let mut gateway = Gateway::new(
//!         source,
//!         client,
//!         RecordParser::new(config.location_id),
//!         GatewaySettings::from(&config),
//!     );
//!     gateway.run(shutdown).await.ok();
//! }
//! ```

pub mod client;
pub mod config;
pub mod gateway;
pub mod line_source;
pub mod parser;
pub mod reading;
pub mod serial;
pub mod simulator;

pub use client::{Deliver, DeliveryClient, DeliveryError, DeliveryResult};
pub use config::{Config, ConfigError};
pub use gateway::{
    ConnectionState, Gateway, GatewayError, GatewaySettings, GatewayStats, OpenPolicy,
};
pub use line_source::{LineSource, SourceError, SourceKind};
pub use parser::{FormatError, RecordParser};
pub use reading::SensorReading;
pub use serial::SerialLineSource;
pub use simulator::{InvalidRangeError, SimulatedLineSource, SimulatorConfig};
