//! Simulated line source for running the gateway without hardware.
//!
//! The simulator speaks the same line format as the sensor unit, so its
//! output goes through the normal parsing path.

use std::io;
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::line_source::{LineSource, SourceError};

/// Default time between simulated readings
const DEFAULT_INTERVAL_SECS: u64 = 5;

/// AQI fluctuates around the moderate-to-poor band
const DEFAULT_AQI_RANGE: RangeInclusive<i64> = 80..=220;

/// Light traffic with occasional bursts
const DEFAULT_VEHICLE_RANGE: RangeInclusive<i64> = 0..=15;

/// A value range that cannot be sampled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRangeError {
    pub field: &'static str,
    pub range: RangeInclusive<i64>,
}

impl std::fmt::Display for InvalidRangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Empty {} range {}..={}",
            self.field,
            self.range.start(),
            self.range.end()
        )
    }
}

impl std::error::Error for InvalidRangeError {}

fn check_range(
    field: &'static str,
    range: RangeInclusive<i64>,
) -> Result<RangeInclusive<i64>, InvalidRangeError> {
    if range.is_empty() {
        return Err(InvalidRangeError { field, range });
    }
    Ok(range)
}

/// Configuration for the simulated source.
///
/// The value ranges are only settable through [`SimulatorConfig::with_ranges`],
/// which rejects empty ranges, so sampling never panics.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Time between emitted lines
    pub interval: Duration,

    /// Inclusive bounds for the air quality index
    aqi_range: RangeInclusive<i64>,

    /// Inclusive bounds for the vehicle count
    vehicle_range: RangeInclusive<i64>,

    /// Fixed RNG seed for reproducible output
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            aqi_range: DEFAULT_AQI_RANGE,
            vehicle_range: DEFAULT_VEHICLE_RANGE,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Replace both value ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRangeError` if either range is empty (start after end).
    pub fn with_ranges(
        mut self,
        aqi: RangeInclusive<i64>,
        vehicles: RangeInclusive<i64>,
    ) -> Result<Self, InvalidRangeError> {
        self.aqi_range = check_range("aqi", aqi)?;
        self.vehicle_range = check_range("vehicle", vehicles)?;
        Ok(self)
    }

    pub fn aqi_range(&self) -> &RangeInclusive<i64> {
        &self.aqi_range
    }

    pub fn vehicle_range(&self) -> &RangeInclusive<i64> {
        &self.vehicle_range
    }
}

/// Line source that synthesizes readings at a fixed cadence.
pub struct SimulatedLineSource {
    config: SimulatorConfig,
    rng: StdRng,
    last_emit: Option<Instant>,
    open: bool,
}

impl SimulatedLineSource {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            rng,
            last_emit: None,
            open: false,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SimulatorConfig::default())
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Produce one line in the device format, regardless of cadence.
    pub fn generate_line(&mut self) -> String {
        let vehicles = self.rng.gen_range(self.config.vehicle_range.clone());
        let aqi = self.rng.gen_range(self.config.aqi_range.clone());
        format!("Vehicles:{},Air:{}", vehicles, aqi)
    }

    fn due(&self, now: Instant) -> bool {
        match self.last_emit {
            None => true,
            Some(last) => now.duration_since(last) >= self.config.interval,
        }
    }
}

impl LineSource for SimulatedLineSource {
    fn open(&mut self) -> Result<(), SourceError> {
        if !self.open {
            info!(
                interval_secs = self.config.interval.as_secs_f64(),
                aqi_range = ?self.config.aqi_range,
                vehicle_range = ?self.config.vehicle_range,
                "Simulator started"
            );
            self.open = true;
            self.last_emit = None;
        }
        Ok(())
    }

    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        if !self.open {
            return Err(SourceError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "simulator is not running",
            )));
        }

        let now = Instant::now();
        if !self.due(now) {
            return Ok(None);
        }

        self.last_emit = Some(now);
        Ok(Some(self.generate_line()))
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn describe(&self) -> String {
        format!("simulator every {:?}", self.config.interval)
    }
}
