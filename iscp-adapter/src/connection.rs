//! Connectivity state machine for one receiver
//!
//! Receivers drop idle sockets, so every command opens a short-lived
//! connection. Connectivity therefore cannot follow socket state. It follows
//! device contact instead:
//!
//! - `Disconnected → Connected` only through [`ConnectionManager::mark_seen`]
//! - `Connected → Disconnected` only through [`ConnectionManager::check_presence`]
//!   (or a forced [`ConnectionManager::set_connected`] on stop)
//!
//! A failed connect attempt never changes connectivity. While disconnected,
//! attempts are rate-limited to one per retry interval.
//!
//! All methods take the current time explicitly so the machine can be driven
//! from tests without a clock.

use std::time::Duration;

use tokio::time::Instant;

use iscp_state::{ConnectivityStatus, ReceiverSettings};

/// Monotonic millisecond clock anchored at adapter start
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Connected/disconnected state plus the bookkeeping that drives it
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    status: ConnectivityStatus,
    last_seen_ms: Option<u64>,
    last_connect_attempt_ms: Option<u64>,
    last_connect_error: Option<String>,
    last_error_report_ms: Option<u64>,
    retry_interval_ms: u64,
    presence_timeout_ms: u64,
}

impl ConnectionManager {
    pub fn new(settings: &ReceiverSettings) -> Self {
        Self {
            status: ConnectivityStatus::Disconnected,
            last_seen_ms: None,
            last_connect_attempt_ms: None,
            last_connect_error: None,
            last_error_report_ms: None,
            retry_interval_ms: duration_ms(settings.retry_interval),
            presence_timeout_ms: duration_ms(settings.presence_timeout),
        }
    }

    /// Pick up new intervals; connectivity and timestamps are kept
    pub fn reconfigure(&mut self, settings: &ReceiverSettings) {
        self.retry_interval_ms = duration_ms(settings.retry_interval);
        self.presence_timeout_ms = duration_ms(settings.presence_timeout);
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    pub fn last_seen_ms(&self) -> Option<u64> {
        self.last_seen_ms
    }

    pub fn last_connect_error(&self) -> Option<&str> {
        self.last_connect_error.as_deref()
    }

    /// Whether the retry interval has elapsed since the last attempt
    pub fn can_attempt_connect(&self, now_ms: u64) -> bool {
        match self.last_connect_attempt_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.retry_interval_ms,
            None => true,
        }
    }

    /// Gate applied before opening a socket: open while connected,
    /// rate-limited while disconnected
    pub fn admits_attempt(&self, now_ms: u64) -> bool {
        self.is_connected() || self.can_attempt_connect(now_ms)
    }

    pub fn mark_connect_attempt(&mut self, now_ms: u64) {
        self.last_connect_attempt_ms = Some(now_ms);
    }

    /// Record a failed connect; returns true when it should be reported
    ///
    /// The same error against the same host is reported at most once per
    /// retry interval.
    pub fn record_connect_failure(&mut self, error: &str, host: &str, now_ms: u64) -> bool {
        let fingerprint = format!("{}|{}", error, host);
        let duplicate = self.last_connect_error.as_deref() == Some(fingerprint.as_str())
            && self
                .last_error_report_ms
                .is_some_and(|last| now_ms.saturating_sub(last) < self.retry_interval_ms);
        if duplicate {
            return false;
        }

        self.last_connect_error = Some(fingerprint);
        self.last_error_report_ms = Some(now_ms);
        true
    }

    /// Note device contact; returns the new status if this connected it
    pub fn mark_seen(&mut self, now_ms: u64) -> Option<ConnectivityStatus> {
        self.last_seen_ms = Some(now_ms);
        self.transition_to(ConnectivityStatus::Connected)
    }

    /// Declare disconnection once the device has been silent too long
    pub fn check_presence(&mut self, now_ms: u64) -> Option<ConnectivityStatus> {
        if !self.is_connected() {
            return None;
        }
        let last_seen = self.last_seen_ms?;
        if now_ms.saturating_sub(last_seen) > self.presence_timeout_ms {
            return self.transition_to(ConnectivityStatus::Disconnected);
        }
        None
    }

    /// Force a status, e.g. disconnected on stop
    pub fn set_connected(&mut self, connected: bool) -> Option<ConnectivityStatus> {
        self.transition_to(ConnectivityStatus::from_connected(connected))
    }

    fn transition_to(&mut self, status: ConnectivityStatus) -> Option<ConnectivityStatus> {
        if self.status == status {
            return None;
        }
        self.status = status;
        Some(status)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
