//! Gateway loop tying the line source, parser and delivery client together.
//!
//! The loop is a single sequential task. It polls the source, parses each
//! line and awaits delivery before polling again, so readings reach the
//! backend in the order the device produced them.
//!
//! Error policy:
//! - a malformed line is logged and dropped
//! - a failed or rejected delivery is logged and the reading dropped
//! - a broken source connection is closed and reopened after a pause
//! - a failed *initial* open follows [`OpenPolicy`]

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::client::Deliver;
use crate::config::Config;
use crate::line_source::{LineSource, SourceError};
use crate::parser::RecordParser;

/// Upper bound for backoff between open attempts.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Shortest wait between open attempts, whatever the settings say.
const MIN_BACKOFF: Duration = Duration::from_millis(100);

/// Connection state of the line source, as seen by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No source handle is held
    Disconnected,

    /// The source is open and being polled
    Connected,

    /// Reopening after a lost connection
    Reconnecting,

    /// The gateway has finished; terminal
    Stopped,
}

/// What to do when the source cannot be opened at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenPolicy {
    /// Give up on the first failure
    #[default]
    FailFast,

    /// Keep trying with exponential backoff; `None` retries forever
    Retry { max_attempts: Option<u32> },
}

/// Timing and policy knobs for the loop.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Idle time after an empty poll
    pub poll_interval: Duration,

    /// Pause after a lost connection, and base delay for open backoff
    pub reconnect_delay: Duration,

    /// Cap for open backoff
    pub max_backoff: Duration,

    /// Startup open behaviour
    pub open_policy: OpenPolicy,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for GatewaySettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            reconnect_delay: config.reconnect_delay,
            max_backoff: DEFAULT_MAX_BACKOFF,
            open_policy: config.open_policy,
        }
    }
}

/// Counters describing what the gateway has done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Raw lines received from the source
    pub lines_read: u64,

    /// Lines that were empty after trimming
    pub blank_lines: u64,

    /// Lines rejected by the parser
    pub parse_failures: u64,

    /// Readings the backend accepted (2xx)
    pub delivered: u64,

    /// Readings the backend answered with a non-2xx status
    pub rejected: u64,

    /// Readings lost to transport errors
    pub delivery_failures: u64,

    /// Times the source connection was lost and reopened
    pub reconnects: u64,
}

/// Fatal gateway errors.
#[derive(Debug)]
pub enum GatewayError {
    /// The line source could not be opened at startup
    Connection(SourceError),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Connection(e) => write!(f, "Could not connect to line source: {}", e),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::Connection(e) => Some(e),
        }
    }
}

/// The ingestion-and-forwarding loop.
pub struct Gateway<S, D> {
    source: S,
    sink: D,
    parser: RecordParser,
    settings: GatewaySettings,
    state: ConnectionState,
    stats: GatewayStats,
}

impl<S, D> Gateway<S, D>
where
    S: LineSource,
    D: Deliver,
{
    pub fn new(source: S, sink: D, parser: RecordParser, settings: GatewaySettings) -> Self {
        Self {
            source,
            sink,
            parser,
            settings,
            state: ConnectionState::Disconnected,
            stats: GatewayStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }

    /// Run until `shutdown` flips to `true` or the initial open fails.
    ///
    /// The source is closed before this returns, whatever the outcome, and
    /// the gateway ends in [`ConnectionState::Stopped`].
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Connection` when the source cannot be opened at
    /// startup and the open policy gives up.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<GatewayStats, GatewayError> {
        info!(
            source = %self.source.describe(),
            endpoint = %self.sink.endpoint(),
            location_id = self.parser.location_id(),
            "Gateway starting"
        );

        let result = self.run_inner(&mut shutdown).await;

        self.source.close();
        self.state = ConnectionState::Stopped;

        info!(
            lines_read = self.stats.lines_read,
            delivered = self.stats.delivered,
            rejected = self.stats.rejected,
            parse_failures = self.stats.parse_failures,
            delivery_failures = self.stats.delivery_failures,
            reconnects = self.stats.reconnects,
            "Gateway stopped"
        );

        result.map(|()| self.stats.clone())
    }

    async fn run_inner(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), GatewayError> {
        if !self.open_initial(shutdown).await? {
            return Ok(());
        }

        loop {
            if *shutdown.borrow() {
                debug!("Shutdown requested");
                return Ok(());
            }

            match self.source.next_line() {
                Ok(Some(line)) => self.handle_line(&line).await,
                Ok(None) => {
                    if !pause(shutdown, self.settings.poll_interval).await {
                        return Ok(());
                    }
                }
                Err(e) => {
                    warn!(error = %e, source = %self.source.describe(), "Line source failed");
                    if !self.reconnect(shutdown).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Open the source at startup according to the open policy.
    ///
    /// Returns `Ok(false)` if shutdown was requested before a connection was
    /// made.
    async fn open_initial(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<bool, GatewayError> {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                return Ok(false);
            }

            attempt += 1;
            match self.source.open() {
                Ok(()) => {
                    self.state = ConnectionState::Connected;
                    info!(
                        source = %self.source.describe(),
                        attempt = attempt,
                        "Line source connected"
                    );
                    return Ok(true);
                }
                Err(e) => {
                    error!(error = %e, attempt = attempt, "Failed to open line source");

                    let max_attempts = match self.settings.open_policy {
                        OpenPolicy::FailFast => return Err(GatewayError::Connection(e)),
                        OpenPolicy::Retry { max_attempts } => max_attempts,
                    };

                    if max_attempts.is_some_and(|max| attempt >= max) {
                        return Err(GatewayError::Connection(e));
                    }

                    let delay = self.backoff_delay(attempt);
                    warn!(
                        attempt = attempt,
                        max_attempts = ?max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying open"
                    );
                    if !pause(shutdown, delay).await {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Close the broken source, wait, and reopen it until it succeeds.
    ///
    /// Returns `false` if shutdown was requested first.
    async fn reconnect(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        self.source.close();
        self.state = ConnectionState::Disconnected;
        self.stats.reconnects += 1;

        if !pause(shutdown, self.settings.reconnect_delay).await {
            return false;
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.state = ConnectionState::Reconnecting;

            match self.source.open() {
                Ok(()) => {
                    self.state = ConnectionState::Connected;
                    info!(
                        source = %self.source.describe(),
                        attempt = attempt,
                        "Line source reconnected"
                    );
                    return true;
                }
                Err(e) => {
                    self.state = ConnectionState::Disconnected;
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        error = %e,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnect failed, retrying"
                    );
                    if !pause(shutdown, delay).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Parse one raw line and forward the reading.
    async fn handle_line(&mut self, raw: &str) {
        self.stats.lines_read += 1;

        let line = raw.trim();
        if line.is_empty() {
            self.stats.blank_lines += 1;
            debug!("Skipping blank line");
            return;
        }

        let reading = match self.parser.parse(line) {
            Ok(reading) => reading,
            Err(e) => {
                self.stats.parse_failures += 1;
                warn!(line = %line, error = %e, "Invalid data format received");
                return;
            }
        };

        match self.sink.send(&reading).await {
            Ok(result) if result.is_success() => {
                self.stats.delivered += 1;
                info!(%reading, status = result.status.as_u16(), "Reading sent");
            }
            Ok(result) => {
                self.stats.rejected += 1;
                warn!(%reading, status = result.status.as_u16(), "Backend rejected reading");
            }
            Err(e) => {
                self.stats.delivery_failures += 1;
                error!(%reading, error = %e, "Backend error, reading dropped");
            }
        }
    }

    /// Exponential backoff with jitter for the given attempt (1-based).
    ///
    /// delay = clamp(base * 2^(attempt-1) + jitter, MIN_BACKOFF, max_backoff)
    ///
    /// The floor holds even when `reconnect_delay` or `max_backoff` is zero,
    /// so a device that stays unplugged never makes the loop spin.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let min = MIN_BACKOFF.as_millis() as u64;
        let base = self.settings.reconnect_delay.as_millis() as u64;
        let max = (self.settings.max_backoff.as_millis() as u64).max(min);

        // Calculate exponential delay: base * 2^(attempt-1)
        let exponential = base.saturating_mul(1 << attempt.saturating_sub(1).min(10));

        // Add jitter (up to 25% of the delay)
        let jitter = rand::random::<u64>() % (exponential / 4 + 1);

        Duration::from_millis(exponential.saturating_add(jitter).clamp(min, max))
    }
}

/// Sleep for `duration` unless shutdown is requested first.
///
/// Returns `true` if the gateway should keep running.
async fn pause(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *shutdown.borrow() {
        return false;
    }

    let changed = tokio::select! {
        _ = tokio::time::sleep(duration) => None,
        changed = shutdown.changed() => Some(changed.is_ok()),
    };

    match changed {
        None | Some(true) => !*shutdown.borrow(),
        // Sender gone: no stop can arrive any more
        Some(false) => {
            tokio::time::sleep(duration).await;
            true
        }
    }
}
