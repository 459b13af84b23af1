use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// Enum to represent the status of a device as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Online,
    Offline,
    Blocked,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "Online",
            DeviceStatus::Offline => "Offline",
            DeviceStatus::Blocked => "Blocked",
        }
    }
}

// A device on the LAN, keyed by MAC address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub mac: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub blocked: bool,
}

impl Device {
    /// Blocking wins over reachability: a blocked device may still be online at the link layer.
    pub fn status(&self) -> DeviceStatus {
        if self.blocked {
            DeviceStatus::Blocked
        } else if self.online {
            DeviceStatus::Online
        } else {
            DeviceStatus::Offline
        }
    }

    pub fn display_name(&self) -> &str {
        known(self.name.as_deref()).unwrap_or("Unknown Device")
    }

    pub fn display_ip(&self) -> Option<&str> {
        known(self.ip.as_deref())
    }

    pub fn display_vendor(&self) -> Option<&str> {
        known(self.vendor.as_deref())
    }

    pub fn same_mac(&self, mac: &str) -> bool {
        self.mac.eq_ignore_ascii_case(mac)
    }

    /// Case-insensitive match against name, MAC and IP.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        [self.name.as_deref(), Some(self.mac.as_str()), self.ip.as_deref()]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&query))
    }
}

fn known(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty() && *v != "Unknown")
}

pub fn filter_devices<'a>(devices: &'a [Device], query: &str) -> Vec<&'a Device> {
    devices.iter().filter(|d| d.matches(query)).collect()
}

// An active time limit; the remote service blocks `mac` at `expires_at`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub mac: String,
    #[serde(with = "expiry")]
    pub expires_at: DateTime<Utc>,
    /// Server-side snapshot, stale as soon as it is received
    #[serde(default)]
    pub remaining_seconds: Option<u64>,
    #[serde(default)]
    pub minutes: Option<u32>,
}

/// Device detail polled while one device is being controlled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDetail {
    pub device: Device,
    pub timer: Option<Timer>,
}

impl DeviceDetail {
    /// A blocked device has no timer concept; surfaces must not offer a time limit for it.
    pub fn can_set_timer(&self) -> bool {
        !self.device.blocked && self.timer.is_none()
    }
}

// ====== Envelope payloads ======

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevicePayload {
    pub device: Device,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenameResult {
    pub mac: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockStatus {
    pub mac: String,
    pub blocked: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockedList {
    #[serde(default)]
    pub blocked: Vec<String>,
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimerPayload {
    #[serde(default)]
    pub timer: Option<Timer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimerList {
    #[serde(default)]
    pub timers: Vec<Timer>,
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CancelResult {
    pub mac: String,
    #[serde(default)]
    pub cancelled: bool,
}

/// Parses a server timestamp.
///
/// RFC 3339 values carry their own offset. Naive values (what the service sends today) are
/// read in the local time zone of this machine.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

mod expiry {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_expiry(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid expires_at timestamp: {raw}")))
    }
}
