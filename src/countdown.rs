//! Countdown derived from an absolute expiry instant.
//!
//! The remaining time is recomputed from the expiry on every tick, never decremented, so it
//! does not depend on network latency or on how often the timer itself is re-fetched. Client
//! and server clocks are assumed to be reasonably close; no skew correction is done.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::{COUNTDOWN_TICK, LOW_TIME_THRESHOLD_SECS};

/// Wall-clock source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock that advances with tokio's clock.
///
/// Under a paused runtime (`tokio::time::pause`) it moves only when tokio time moves.
#[derive(Debug, Clone)]
pub struct TokioClock {
    wall_origin: DateTime<Utc>,
    origin: Instant,
}

impl TokioClock {
    pub fn starting_at(wall_origin: DateTime<Utc>) -> Self {
        Self {
            wall_origin,
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().duration_since(self.origin);
        self.wall_origin
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    pub remaining_seconds: u64,
    pub is_expired: bool,
    pub formatted: String,
}

impl Countdown {
    pub fn compute(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let remaining_seconds = expires_at
            .map(|expiry| remaining_seconds(expiry, now))
            .unwrap_or(0);
        Self {
            remaining_seconds,
            is_expired: remaining_seconds == 0,
            formatted: format_remaining(remaining_seconds),
        }
    }

    /// Presentation hint: less than five minutes left.
    pub fn is_low(&self) -> bool {
        !self.is_expired && self.remaining_seconds < LOW_TIME_THRESHOLD_SECS
    }
}

/// Whole seconds until `expiry`, floored, never negative.
pub fn remaining_seconds(expiry: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (expiry - now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis / 1000) as u64
    }
}

/// `H:MM:SS` from one hour up, `M:SS` below.
pub fn format_remaining(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Running countdown. Dropping the handle stops the ticker.
pub struct CountdownHandle {
    rx: watch::Receiver<Countdown>,
    task: JoinHandle<()>,
}

impl CountdownHandle {
    pub fn current(&self) -> Countdown {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Countdown> {
        self.rx.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct CountdownTicker;

impl CountdownTicker {
    /// Publishes a fresh [`Countdown`] every second until it reports expiry, then stops.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(expires_at: Option<DateTime<Utc>>, clock: Arc<dyn Clock>) -> CountdownHandle {
        let initial = Countdown::compute(expires_at, clock.now());
        let already_expired = initial.is_expired;
        let (tx, rx) = watch::channel(initial);

        let task = tokio::spawn(async move {
            if already_expired {
                return;
            }

            let mut interval = time::interval_at(Instant::now() + COUNTDOWN_TICK, COUNTDOWN_TICK);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let next = Countdown::compute(expires_at, clock.now());
                let expired = next.is_expired;
                if tx.send(next).is_err() || expired {
                    break;
                }
            }
            tracing::debug!("Countdown finished");
        });

        CountdownHandle { rx, task }
    }
}
