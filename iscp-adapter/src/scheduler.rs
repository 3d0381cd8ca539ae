//! Refresh timing for one receiver
//!
//! One periodic timer drives full-state refreshes. Its period is the poll
//! interval while the receiver is connected and the retry interval while it
//! is not, and it is rebuilt whenever that choice changes. A one-shot delay
//! after start seeds state before the first period elapses.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::debug;

use iscp_state::ReceiverSettings;

/// Which timer produced a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTick {
    /// The one-shot delayed refresh after start
    Initial,
    /// The periodic refresh
    Periodic,
}

#[derive(Debug)]
pub struct PollScheduler {
    period: Duration,
    interval: Interval,
    initial: Option<Pin<Box<Sleep>>>,
}

impl PollScheduler {
    pub fn new(settings: &ReceiverSettings, connected: bool, initial_delay: Duration) -> Self {
        let period = Self::period_for(settings, connected);
        Self {
            period,
            interval: Self::build_interval(period),
            initial: Some(Box::pin(tokio::time::sleep(initial_delay))),
        }
    }

    /// Interval that applies for the given connectivity
    pub fn period_for(settings: &ReceiverSettings, connected: bool) -> Duration {
        if connected {
            settings.poll_interval
        } else {
            settings.retry_interval
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn has_pending_initial(&self) -> bool {
        self.initial.is_some()
    }

    /// Re-evaluate the period; the timer restarts only when it changes
    pub fn retune(&mut self, settings: &ReceiverSettings, connected: bool) {
        let period = Self::period_for(settings, connected);
        if period == self.period {
            return;
        }
        debug!(
            from_ms = self.period.as_millis() as u64,
            to_ms = period.as_millis() as u64,
            "Refresh interval changed"
        );
        self.period = period;
        self.interval = Self::build_interval(period);
    }

    /// Wait for the next refresh; cancel-safe
    pub async fn tick(&mut self) -> PollTick {
        let initial_fired = match self.initial.as_mut() {
            Some(initial) => tokio::select! {
                _ = initial => true,
                _ = self.interval.tick() => false,
            },
            None => {
                self.interval.tick().await;
                false
            }
        };

        if initial_fired {
            self.initial = None;
            PollTick::Initial
        } else {
            PollTick::Periodic
        }
    }

    fn build_interval(period: Duration) -> Interval {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}
