//! Configuration constants for the access-control client

use std::time::Duration;

// ====== Remote service defaults ======

/// Base URL used when nothing is configured
pub const DEFAULT_API_URL: &str = "http://192.168.100.16:5000";

/// API key used when nothing is configured
pub const DEFAULT_API_KEY: &str = "armas-wifi-secret-2026";

/// Header carrying the API key on every request
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Environment overrides for the settings above
pub const ENV_API_URL: &str = "NET_CURFEW_API_URL";
pub const ENV_API_KEY: &str = "NET_CURFEW_API_KEY";

// ====== Polling cadences ======

/// Aggregate device list refresh (dashboard)
pub const DEVICE_LIST_INTERVAL: Duration = Duration::from_secs(30);

/// Active timer list refresh (dashboard)
pub const TIMER_LIST_INTERVAL: Duration = Duration::from_secs(30);

/// Single device + timer refresh while a device is being controlled
pub const DEVICE_DETAIL_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest cadence a poller accepts
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

// ====== Countdown ======

/// Countdown recompute cadence
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Below this many seconds a countdown is flagged as running low
pub const LOW_TIME_THRESHOLD_SECS: u64 = 5 * 60;

// ====== Timer input ======

/// Quick-pick durations offered for a time limit, in minutes
pub const TIMER_PRESETS: &[(&str, u32)] = &[
    ("15 min", 15),
    ("30 min", 30),
    ("1 hour", 60),
    ("2 hours", 120),
];

/// Maximum digits accepted for a custom duration
pub const CUSTOM_MINUTES_MAX_DIGITS: usize = 4;

/// Capacity of the mutation notification channel
pub const NOTIFICATION_CAPACITY: usize = 32;
