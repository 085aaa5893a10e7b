//! HTTP delivery client for forwarding readings to the backend.
//!
//! Each reading is one POST with a JSON body. Delivery is a single attempt:
//! there is no retry and no queue, so a backend outage drops readings instead
//! of building a backlog. Non-2xx responses are returned to the caller, not
//! raised as errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::config::Config;
use crate::reading::SensorReading;

/// Outcome of a completed HTTP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryResult {
    /// Status code returned by the backend
    pub status: StatusCode,
}

impl DeliveryResult {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }

    /// Whether the backend answered with a 2xx status.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Transport-level delivery failures.
#[derive(Debug)]
pub enum DeliveryError {
    /// The request did not complete within the configured timeout
    Timeout,

    /// The backend could not be reached (refused, DNS, TLS)
    Connect(reqwest::Error),

    /// Any other failure while sending the request
    Request(reqwest::Error),

    /// Client configuration error
    Config(String),
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Timeout => write!(f, "Request timed out"),
            DeliveryError::Connect(e) => write!(f, "Backend unreachable: {}", e),
            DeliveryError::Request(e) => write!(f, "HTTP request failed: {}", e),
            DeliveryError::Config(e) => write!(f, "Client configuration error: {}", e),
        }
    }
}

impl std::error::Error for DeliveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeliveryError::Connect(e) | DeliveryError::Request(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeliveryError::Timeout
        } else if err.is_connect() {
            DeliveryError::Connect(err)
        } else {
            DeliveryError::Request(err)
        }
    }
}

/// Destination for parsed readings.
///
/// The gateway depends on this trait rather than on [`DeliveryClient`] so
/// that delivery can be faked in tests.
#[async_trait]
pub trait Deliver {
    /// Deliver one reading, returning the backend's status code.
    async fn send(&self, reading: &SensorReading) -> Result<DeliveryResult, DeliveryError>;

    /// Where readings are delivered, for logs.
    fn endpoint(&self) -> &str;
}

/// HTTP client for posting readings to the backend.
///
/// One `reqwest::Client` is reused for every request so connections are
/// pooled between readings.
pub struct DeliveryClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl DeliveryClient {
    /// Create a client from the gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Config` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, DeliveryError> {
        Self::with_settings(config.backend_url.clone(), config.request_timeout)
    }

    /// Create a client for an explicit endpoint and timeout.
    pub fn with_settings(
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| DeliveryError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Deliver for DeliveryClient {
    async fn send(&self, reading: &SensorReading) -> Result<DeliveryResult, DeliveryError> {
        debug!(url = %self.endpoint, %reading, "Posting reading");

        let response = self
            .client
            .post(&self.endpoint)
            .json(reading)
            .send()
            .await?;

        Ok(DeliveryResult::new(response.status()))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accept one connection, answer with `status_line`, and hand back the
    /// raw request body.
    async fn one_shot_server(status_line: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut data = Vec::new();
            let mut buf = [0u8; 1024];

            let body = loop {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "client closed before sending a full request");
                data.extend_from_slice(&buf[..n]);

                let text = String::from_utf8_lossy(&data).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let headers = text[..split].to_lowercase();
                    let length = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    let body = &text[split + 4..];
                    if body.len() >= length {
                        break format!("{}\n{}", headers, body);
                    }
                }
            };

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                status_line
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            body
        });

        (format!("http://{}/api/updateSensor", addr), handle)
    }

    #[test]
    fn test_delivery_error_display() {
        assert_eq!(DeliveryError::Timeout.to_string(), "Request timed out");
        assert_eq!(
            DeliveryError::Config("bad".to_string()).to_string(),
            "Client configuration error: bad"
        );
    }

    #[test]
    fn test_client_from_config() {
        let config = Config::default();
        let client = DeliveryClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:3000/api/updateSensor");
        assert_eq!(client.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_delivery_result_success() {
        assert!(DeliveryResult::new(StatusCode::OK).is_success());
        assert!(DeliveryResult::new(StatusCode::CREATED).is_success());
        assert!(!DeliveryResult::new(StatusCode::INTERNAL_SERVER_ERROR).is_success());
    }

    #[tokio::test]
    async fn test_send_posts_json_reading() {
        let (url, server) = one_shot_server("200 OK").await;
        let client = DeliveryClient::with_settings(url, Duration::from_secs(5)).unwrap();

        let result = client.send(&SensorReading::new(9, 692, 176)).await.unwrap();
        assert_eq!(result.status, StatusCode::OK);

        let request = server.await.unwrap();
        assert!(request.starts_with("post /api/updatesensor"));
        assert!(request.contains("content-type: application/json"));

        let body = request.split_once('\n').map(|(_, b)| b).unwrap_or_default();
        let body_start = body.find('{').unwrap();
        let json: serde_json::Value = serde_json::from_str(&body[body_start..]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"locationId": 9, "aqi": 692, "vehicle_count": 176})
        );
    }

    #[tokio::test]
    async fn test_non_success_status_is_returned_not_raised() {
        let (url, server) = one_shot_server("503 Service Unavailable").await;
        let client = DeliveryClient::with_settings(url, Duration::from_secs(5)).unwrap();

        let result = client.send(&SensorReading::new(1, 2, 3)).await.unwrap();
        assert_eq!(result.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!result.is_success());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        // Grab a free port, then release it so nothing is listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = DeliveryClient::with_settings(
            format!("http://{}/api/updateSensor", addr),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = client.send(&SensorReading::new(1, 2, 3)).await.unwrap_err();
        assert!(
            matches!(err, DeliveryError::Connect(_) | DeliveryError::Request(_)),
            "unexpected error: {}",
            err
        );
    }
}
