//! Configuration module for the sensor gateway.
//!
//! Settings are read once at startup from environment variables. Nothing is
//! reloaded while the gateway runs.

use std::env;
use std::time::Duration;

use reqwest::Url;

use crate::gateway::OpenPolicy;
use crate::line_source::SourceKind;

/// Default serial device address
const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

/// Default baud rate of the sensor unit
const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default backend endpoint for sensor updates
const DEFAULT_BACKEND_URL: &str = "http://localhost:3000/api/updateSensor";

/// Default deployment location
const DEFAULT_LOCATION_ID: i64 = 9;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const MIN_REQUEST_TIMEOUT_SECS: u64 = 1;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
const MIN_POLL_INTERVAL_MS: u64 = 1;
const MAX_POLL_INTERVAL_MS: u64 = 10_000;

const DEFAULT_RECONNECT_DELAY_SECS: u64 = 1;
const MIN_RECONNECT_DELAY_SECS: u64 = 1;
const MAX_RECONNECT_DELAY_SECS: u64 = 300;

const DEFAULT_SIM_INTERVAL_SECS: u64 = 5;
const MIN_SIM_INTERVAL_SECS: u64 = 1;
const MAX_SIM_INTERVAL_SECS: u64 = 3600;

const ENV_SOURCE: &str = "GATEWAY_SOURCE";
const ENV_SERIAL_PORT: &str = "GATEWAY_SERIAL_PORT";
const ENV_BAUD_RATE: &str = "GATEWAY_BAUD_RATE";
const ENV_BACKEND_URL: &str = "GATEWAY_BACKEND_URL";
const ENV_LOCATION_ID: &str = "GATEWAY_LOCATION_ID";
const ENV_REQUEST_TIMEOUT: &str = "GATEWAY_REQUEST_TIMEOUT_SECS";
const ENV_POLL_INTERVAL: &str = "GATEWAY_POLL_INTERVAL_MS";
const ENV_RECONNECT_DELAY: &str = "GATEWAY_RECONNECT_DELAY_SECS";
const ENV_OPEN_POLICY: &str = "GATEWAY_OPEN_POLICY";
const ENV_OPEN_MAX_ATTEMPTS: &str = "GATEWAY_OPEN_MAX_ATTEMPTS";
const ENV_SIM_INTERVAL: &str = "GATEWAY_SIM_INTERVAL_SECS";

/// Configuration for the sensor gateway.
///
/// Every field can be set through a `GATEWAY_*` environment variable; see
/// [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Where readings come from
    pub source: SourceKind,

    /// Serial device address (e.g. `/dev/ttyUSB0`, `COM6`)
    pub serial_port: String,

    /// Serial baud rate
    pub baud_rate: u32,

    /// Full URL readings are POSTed to
    pub backend_url: String,

    /// Location identifier stamped on every reading
    pub location_id: i64,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Idle time between empty polls of the line source
    pub poll_interval: Duration,

    /// Pause after a lost connection before reopening
    pub reconnect_delay: Duration,

    /// What to do when the first open fails
    pub open_policy: OpenPolicy,

    /// Cadence of the simulated source
    pub sim_interval: Duration,
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl ConfigError {
    fn for_var(env_var: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: Some(env_var.to_string()),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// - `GATEWAY_SOURCE`: `serial` or `simulated` (default: serial)
    /// - `GATEWAY_SERIAL_PORT`: device address (default: /dev/ttyUSB0)
    /// - `GATEWAY_BAUD_RATE`: baud rate (default: 9600)
    /// - `GATEWAY_BACKEND_URL`: endpoint URL (default: http://localhost:3000/api/updateSensor)
    /// - `GATEWAY_LOCATION_ID`: deployment location (default: 9)
    /// - `GATEWAY_REQUEST_TIMEOUT_SECS`: HTTP timeout (default: 10)
    /// - `GATEWAY_POLL_INTERVAL_MS`: idle time between empty polls (default: 50)
    /// - `GATEWAY_RECONNECT_DELAY_SECS`: pause before reopening (default: 1)
    /// - `GATEWAY_OPEN_POLICY`: `fail-fast` or `retry` (default: fail-fast)
    /// - `GATEWAY_OPEN_MAX_ATTEMPTS`: retry cap for `retry` (default: unbounded)
    /// - `GATEWAY_SIM_INTERVAL_SECS`: simulator cadence (default: 5)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the offending variable when a value does
    /// not parse or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Load source selection
        let source = match lookup(ENV_SOURCE) {
            Some(value) => SourceKind::from_name(&value).ok_or_else(|| {
                ConfigError::for_var(
                    ENV_SOURCE,
                    format!("'{}' is not one of: serial, simulated", value),
                )
            })?,
            None => SourceKind::default(),
        };

        // Load serial device settings
        let serial_port = lookup(ENV_SERIAL_PORT)
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| DEFAULT_SERIAL_PORT.to_string());
        if serial_port.is_empty() {
            return Err(ConfigError::for_var(ENV_SERIAL_PORT, "must not be empty"));
        }

        let baud_rate: u32 = parse_number(&lookup, ENV_BAUD_RATE, DEFAULT_BAUD_RATE)?;
        if baud_rate == 0 {
            return Err(ConfigError::for_var(
                ENV_BAUD_RATE,
                "baud rate must be greater than 0",
            ));
        }

        // Load and validate backend endpoint
        let backend_url = Self::parse_backend_url(&lookup)?;
        let location_id: i64 = parse_number(&lookup, ENV_LOCATION_ID, DEFAULT_LOCATION_ID)?;

        // Load timing settings
        let request_timeout = Duration::from_secs(parse_bounded(
            &lookup,
            ENV_REQUEST_TIMEOUT,
            DEFAULT_REQUEST_TIMEOUT_SECS,
            MIN_REQUEST_TIMEOUT_SECS,
            MAX_REQUEST_TIMEOUT_SECS,
        )?);

        let poll_interval = Duration::from_millis(parse_bounded(
            &lookup,
            ENV_POLL_INTERVAL,
            DEFAULT_POLL_INTERVAL_MS,
            MIN_POLL_INTERVAL_MS,
            MAX_POLL_INTERVAL_MS,
        )?);

        let reconnect_delay = Duration::from_secs(parse_bounded(
            &lookup,
            ENV_RECONNECT_DELAY,
            DEFAULT_RECONNECT_DELAY_SECS,
            MIN_RECONNECT_DELAY_SECS,
            MAX_RECONNECT_DELAY_SECS,
        )?);

        // Load open policy (fail-fast unless retry is requested)
        let open_policy = Self::parse_open_policy(&lookup)?;

        // Load simulator cadence (only used with the simulated source)
        let sim_interval = Duration::from_secs(parse_bounded(
            &lookup,
            ENV_SIM_INTERVAL,
            DEFAULT_SIM_INTERVAL_SECS,
            MIN_SIM_INTERVAL_SECS,
            MAX_SIM_INTERVAL_SECS,
        )?);

        Ok(Self {
            source,
            serial_port,
            baud_rate,
            backend_url,
            location_id,
            request_timeout,
            poll_interval,
            reconnect_delay,
            open_policy,
            sim_interval,
        })
    }

    fn parse_backend_url<F>(lookup: &F) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(ENV_BACKEND_URL).unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let raw = raw.trim();

        let url = Url::parse(raw)
            .map_err(|e| ConfigError::for_var(ENV_BACKEND_URL, format!("'{}': {}", raw, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(raw.to_string()),
            other => Err(ConfigError::for_var(
                ENV_BACKEND_URL,
                format!("unsupported scheme '{}', expected http or https", other),
            )),
        }
    }

    fn parse_open_policy<F>(lookup: &F) -> Result<OpenPolicy, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_attempts = match lookup(ENV_OPEN_MAX_ATTEMPTS) {
            Some(value) => {
                let attempts: u32 = value.trim().parse().map_err(|_| {
                    ConfigError::for_var(
                        ENV_OPEN_MAX_ATTEMPTS,
                        format!("'{}' is not a valid number", value),
                    )
                })?;
                if attempts == 0 {
                    return Err(ConfigError::for_var(
                        ENV_OPEN_MAX_ATTEMPTS,
                        "max attempts must be greater than 0",
                    ));
                }
                Some(attempts)
            }
            None => None,
        };

        match lookup(ENV_OPEN_POLICY) {
            None => Ok(OpenPolicy::FailFast),
            Some(value) => match value.trim().to_lowercase().as_str() {
                "fail-fast" | "failfast" | "fail_fast" => Ok(OpenPolicy::FailFast),
                "retry" => Ok(OpenPolicy::Retry { max_attempts }),
                _ => Err(ConfigError::for_var(
                    ENV_OPEN_POLICY,
                    format!("'{}' is not one of: fail-fast, retry", value),
                )),
            },
        }
    }
}

/// Parse an optional numeric variable, falling back to `default`.
fn parse_number<F, T>(lookup: &F, env_var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(env_var) {
        Some(value) => value.trim().parse().map_err(|_| {
            ConfigError::for_var(env_var, format!("'{}' is not a valid number", value))
        }),
        None => Ok(default),
    }
}

/// Parse an optional `u64` variable and check it against `[min, max]`.
fn parse_bounded<F>(
    lookup: &F,
    env_var: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value: u64 = parse_number(lookup, env_var, default)?;

    if value < min {
        return Err(ConfigError::for_var(
            env_var,
            format!("{} is below minimum ({})", value, min),
        ));
    }

    if value > max {
        return Err(ConfigError::for_var(
            env_var,
            format!("{} exceeds maximum ({})", value, max),
        ));
    }

    Ok(value)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            serial_port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            location_id: DEFAULT_LOCATION_ID,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            open_policy: OpenPolicy::FailFast,
            sim_interval: Duration::from_secs(DEFAULT_SIM_INTERVAL_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source, SourceKind::Serial);
        assert_eq!(config.serial_port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.backend_url, "http://localhost:3000/api/updateSensor");
        assert_eq!(config.location_id, 9);
        assert_eq!(config.open_policy, OpenPolicy::FailFast);
    }

    #[test]
    fn test_empty_lookup_matches_defaults() {
        let config = load(&[]).expect("Should load with defaults");
        let defaults = Config::default();
        assert_eq!(config.serial_port, defaults.serial_port);
        assert_eq!(config.baud_rate, defaults.baud_rate);
        assert_eq!(config.backend_url, defaults.backend_url);
        assert_eq!(config.request_timeout, defaults.request_timeout);
        assert_eq!(config.poll_interval, defaults.poll_interval);
        assert_eq!(config.reconnect_delay, defaults.reconnect_delay);
        assert_eq!(config.sim_interval, defaults.sim_interval);
    }

    #[test]
    fn test_custom_values() {
        let config = load(&[
            ("GATEWAY_SOURCE", "simulated"),
            ("GATEWAY_SERIAL_PORT", "COM6"),
            ("GATEWAY_BAUD_RATE", "115200"),
            ("GATEWAY_BACKEND_URL", "https://example.com/api/updateSensor"),
            ("GATEWAY_LOCATION_ID", "10"),
            ("GATEWAY_REQUEST_TIMEOUT_SECS", "3"),
            ("GATEWAY_POLL_INTERVAL_MS", "20"),
            ("GATEWAY_RECONNECT_DELAY_SECS", "2"),
            ("GATEWAY_SIM_INTERVAL_SECS", "2"),
        ])
        .expect("Should load custom values");

        assert_eq!(config.source, SourceKind::Simulated);
        assert_eq!(config.serial_port, "COM6");
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.backend_url, "https://example.com/api/updateSensor");
        assert_eq!(config.location_id, 10);
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.sim_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_source() {
        let err = load(&[("GATEWAY_SOURCE", "bluetooth")]).unwrap_err();
        assert_eq!(err.env_var.as_deref(), Some("GATEWAY_SOURCE"));
        assert!(err.message.contains("bluetooth"));
    }

    #[test]
    fn test_invalid_baud_rate() {
        let err = load(&[("GATEWAY_BAUD_RATE", "fast")]).unwrap_err();
        assert!(err.message.contains("not a valid number"));

        let err = load(&[("GATEWAY_BAUD_RATE", "0")]).unwrap_err();
        assert!(err.message.contains("greater than 0"));
    }

    #[test]
    fn test_empty_serial_port() {
        let err = load(&[("GATEWAY_SERIAL_PORT", "  ")]).unwrap_err();
        assert_eq!(err.env_var.as_deref(), Some("GATEWAY_SERIAL_PORT"));
    }

    #[test]
    fn test_invalid_backend_url() {
        let err = load(&[("GATEWAY_BACKEND_URL", "not a url")]).unwrap_err();
        assert_eq!(err.env_var.as_deref(), Some("GATEWAY_BACKEND_URL"));

        let err = load(&[("GATEWAY_BACKEND_URL", "ftp://example.com/x")]).unwrap_err();
        assert!(err.message.contains("unsupported scheme"));
    }

    #[test]
    fn test_negative_location_id_is_accepted() {
        let config = load(&[("GATEWAY_LOCATION_ID", "-1")]).unwrap();
        assert_eq!(config.location_id, -1);
    }

    #[test]
    fn test_bounds() {
        let err = load(&[("GATEWAY_REQUEST_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(err.message.contains("below minimum"));

        let err = load(&[("GATEWAY_POLL_INTERVAL_MS", "999999")]).unwrap_err();
        assert!(err.message.contains("exceeds maximum"));

        let err = load(&[("GATEWAY_SIM_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(err.message.contains("below minimum"));
    }

    #[test]
    fn test_zero_reconnect_delay_rejected() {
        let err = load(&[("GATEWAY_RECONNECT_DELAY_SECS", "0")]).unwrap_err();
        assert_eq!(err.env_var.as_deref(), Some("GATEWAY_RECONNECT_DELAY_SECS"));
        assert!(err.message.contains("below minimum"));
    }

    #[test]
    fn test_open_policy() {
        let config = load(&[("GATEWAY_OPEN_POLICY", "retry")]).unwrap();
        assert_eq!(config.open_policy, OpenPolicy::Retry { max_attempts: None });

        let config = load(&[
            ("GATEWAY_OPEN_POLICY", "retry"),
            ("GATEWAY_OPEN_MAX_ATTEMPTS", "5"),
        ])
        .unwrap();
        assert_eq!(config.open_policy, OpenPolicy::Retry { max_attempts: Some(5) });

        let config = load(&[("GATEWAY_OPEN_POLICY", "Fail-Fast")]).unwrap();
        assert_eq!(config.open_policy, OpenPolicy::FailFast);

        let err = load(&[("GATEWAY_OPEN_POLICY", "sometimes")]).unwrap_err();
        assert_eq!(err.env_var.as_deref(), Some("GATEWAY_OPEN_POLICY"));

        let err = load(&[
            ("GATEWAY_OPEN_POLICY", "retry"),
            ("GATEWAY_OPEN_MAX_ATTEMPTS", "0"),
        ])
        .unwrap_err();
        assert!(err.message.contains("greater than 0"));
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError {
            message: "test error".to_string(),
            env_var: Some("TEST_VAR".to_string()),
        };
        assert_eq!(
            format!("{}", error),
            "Configuration error for TEST_VAR: test error"
        );

        let error_no_var = ConfigError {
            message: "general error".to_string(),
            env_var: None,
        };
        assert_eq!(
            format!("{}", error_no_var),
            "Configuration error: general error"
        );
    }
}
