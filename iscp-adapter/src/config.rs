//! Adapter timing and wire-format configuration
//!
//! Per-device values (intervals, volume scale) come from the device
//! descriptor. This struct holds the fixed timing of socket operations.

use std::time::Duration;

use iscp_codec::{Framing, Terminator};

use crate::error::{AdapterError, Result};

/// Configuration for a [`ReceiverAdapter`](crate::ReceiverAdapter)
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
    /// Upper bound for a TCP connect
    /// Default: 1500 ms
    pub connect_timeout: Duration,

    /// Slice length while waiting for connect or the first response bytes
    /// Default: 100 ms
    pub wait_step: Duration,

    /// Slice length while draining further response bytes
    /// Default: 50 ms
    pub drain_step: Duration,

    /// Upper bound for the graceful close after each exchange
    /// Default: 300 ms
    pub disconnect_grace: Duration,

    /// Slice length while waiting for the close
    /// Default: 50 ms
    pub disconnect_step: Duration,

    /// Response wait for each state query during a refresh
    /// Default: 800 ms
    pub refresh_timeout: Duration,

    /// Response wait for the probe actions
    /// Default: 1500 ms
    pub probe_timeout: Duration,

    /// Delay before the one-shot refresh after start
    /// Default: 1500 ms
    pub initial_refresh_delay: Duration,

    /// Period of the presence check
    /// Default: 2 seconds
    pub presence_check_interval: Duration,

    /// Whether a completed TCP connect counts as device contact
    ///
    /// When true, an accepted connection marks the receiver present before
    /// it sends anything, so connectivity comes up on the first command. A
    /// port held open by something other than a receiver also counts.
    /// When false, only received reports count as contact; this is stricter
    /// but the channel stays disconnected until the first query is answered.
    /// Default: true
    pub connect_counts_as_seen: bool,

    /// Frame wrapper used on the wire
    pub framing: Framing,

    /// Payload terminator
    pub terminator: Terminator,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(1500),
            wait_step: Duration::from_millis(100),
            drain_step: Duration::from_millis(50),
            disconnect_grace: Duration::from_millis(300),
            disconnect_step: Duration::from_millis(50),
            refresh_timeout: Duration::from_millis(800),
            probe_timeout: Duration::from_millis(1500),
            initial_refresh_delay: Duration::from_millis(1500),
            presence_check_interval: Duration::from_secs(2),
            connect_counts_as_seen: true,
            framing: Framing::Eiscp,
            terminator: Terminator::Cr,
        }
    }
}

impl AdapterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Short timings for tests against a local mock receiver
    pub fn fast() -> Self {
        Self {
            connect_timeout: Duration::from_millis(300),
            wait_step: Duration::from_millis(20),
            drain_step: Duration::from_millis(10),
            disconnect_grace: Duration::from_millis(60),
            disconnect_step: Duration::from_millis(10),
            refresh_timeout: Duration::from_millis(200),
            probe_timeout: Duration::from_millis(300),
            initial_refresh_delay: Duration::from_millis(50),
            presence_check_interval: Duration::from_millis(100),
            ..Default::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_initial_refresh_delay(mut self, delay: Duration) -> Self {
        self.initial_refresh_delay = delay;
        self
    }

    pub fn with_presence_check_interval(mut self, interval: Duration) -> Self {
        self.presence_check_interval = interval;
        self
    }

    pub fn with_connect_counts_as_seen(mut self, enabled: bool) -> Self {
        self.connect_counts_as_seen = enabled;
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let steps = [
            ("wait_step", self.wait_step),
            ("drain_step", self.drain_step),
            ("disconnect_step", self.disconnect_step),
            ("presence_check_interval", self.presence_check_interval),
        ];
        for (name, value) in steps {
            if value.is_zero() {
                return Err(AdapterError::Config(format!("{} must be greater than 0", name)));
            }
        }

        if self.connect_timeout < self.wait_step {
            return Err(AdapterError::Config(
                "connect_timeout must be at least wait_step".to_string(),
            ));
        }

        if self.disconnect_grace < self.disconnect_step {
            return Err(AdapterError::Config(
                "disconnect_grace must be at least disconnect_step".to_string(),
            ));
        }

        Ok(())
    }
}
