//! In-memory stand-in for the remote access-control service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};

use net_curfew::{
    ApiError, ApiRequest, ApiResult, Clock, Device, Method, SettingsProvider, Transport,
};

pub const MAC: &str = "AA:BB:CC:DD:EE:FF";
pub const OTHER_MAC: &str = "11:22:33:44:55:66";
pub const GOOD_URL: &str = "http://192.168.100.16:5000";
pub const DEVICE_PATH: &str = "/api/devices/AA%3ABB%3ACC%3ADD%3AEE%3AFF";

pub fn wall_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap()
}

pub fn device(mac: &str, name: &str, online: bool) -> Device {
    Device {
        mac: mac.to_string(),
        name: Some(name.to_string()),
        ip: Some("192.168.100.42".to_string()),
        vendor: None,
        online,
        blocked: false,
    }
}

#[derive(Default)]
struct RemoteState {
    devices: Vec<Device>,
    timers: HashMap<String, (DateTime<Utc>, u32)>,
    failures: Vec<(Method, String, String)>,
    delays: Vec<(Method, String, Duration)>,
    log: Vec<(Method, String)>,
}

/// Behaves like the real service: enforces timers against `clock`, answers with envelope data.
pub struct FakeRemote {
    state: Mutex<RemoteState>,
    clock: Arc<dyn Clock>,
    settings: Option<Arc<dyn SettingsProvider>>,
}

impl FakeRemote {
    pub fn new(clock: Arc<dyn Clock>, devices: Vec<Device>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RemoteState {
                devices,
                ..Default::default()
            }),
            clock,
            settings: None,
        })
    }

    /// Only reachable while `settings` points at [`GOOD_URL`].
    pub fn behind(
        clock: Arc<dyn Clock>,
        devices: Vec<Device>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RemoteState {
                devices,
                ..Default::default()
            }),
            clock,
            settings: Some(settings),
        })
    }

    /// Every matching request is rejected with `message` until [`FakeRemote::heal`].
    pub fn fail(&self, method: Method, path: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((method, path.to_string(), message.to_string()));
    }

    pub fn heal(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Matching requests take `delay` (tokio time) before they are answered.
    pub fn delay(&self, method: Method, path: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .delays
            .push((method, path.to_string(), delay));
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|(m, p)| *m == method && p == path)
            .count()
    }

    pub fn device(&self, mac: &str) -> Option<Device> {
        self.state
            .lock()
            .unwrap()
            .devices
            .iter()
            .find(|d| d.same_mac(mac))
            .cloned()
    }

    pub fn has_timer(&self, mac: &str) -> bool {
        self.state.lock().unwrap().timers.contains_key(mac)
    }

    fn delay_for(&self, request: &ApiRequest) -> Duration {
        self.state
            .lock()
            .unwrap()
            .delays
            .iter()
            .find(|(m, p, _)| *m == request.method && *p == request.path)
            .map(|(_, _, d)| *d)
            .unwrap_or(Duration::ZERO)
    }

    fn handle(&self, request: &ApiRequest) -> ApiResult<Value> {
        if let Some(settings) = &self.settings {
            if settings.current().api_url != GOOD_URL {
                return Err(ApiError::unreachable(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }
        }

        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        state.log.push((request.method, request.path.clone()));

        if let Some((_, _, message)) = state
            .failures
            .iter()
            .find(|(m, p, _)| *m == request.method && *p == request.path)
        {
            return Err(ApiError::rejected(
                Some("INJECTED".to_string()),
                Some(message.clone()),
            ));
        }

        // The service blocks devices whose timer has run out.
        let expired: Vec<String> = state
            .timers
            .iter()
            .filter(|(_, (expiry, _))| *expiry <= now)
            .map(|(mac, _)| mac.clone())
            .collect();
        for mac in expired {
            state.timers.remove(&mac);
            if let Some(device) = state.devices.iter_mut().find(|d| d.same_mac(&mac)) {
                device.blocked = true;
            }
        }

        let segments: Vec<String> = request
            .path
            .trim_start_matches('/')
            .split('/')
            .map(|s| percent_decode_str(s).decode_utf8_lossy().to_string())
            .collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let body_mac = request
            .body
            .as_ref()
            .and_then(|b| b.get("mac"))
            .and_then(Value::as_str)
            .map(str::to_string);

        match (request.method, segments.as_slice()) {
            (Method::Get, ["api", "health"]) => Ok(json!({"status": "ok"})),
            (Method::Get, ["api", "devices"]) | (Method::Get, ["api", "scan"]) => {
                Ok(json!({"devices": state.devices, "count": state.devices.len()}))
            }
            (Method::Get, ["api", "devices", mac]) => {
                let device = find(&state.devices, mac)?;
                Ok(json!({ "device": device }))
            }
            (Method::Put, ["api", "devices", mac, "name"]) => {
                let name = request
                    .body
                    .as_ref()
                    .and_then(|b| b.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let device = state
                    .devices
                    .iter_mut()
                    .find(|d| d.same_mac(mac))
                    .ok_or_else(|| not_found(mac))?;
                device.name = Some(name.clone());
                Ok(json!({"mac": device.mac, "name": name}))
            }
            (Method::Post, ["api", "control", action]) => {
                let mac = body_mac.unwrap_or_default();
                let blocked = *action == "block";
                let device = state
                    .devices
                    .iter_mut()
                    .find(|d| d.same_mac(&mac))
                    .ok_or_else(|| not_found(&mac))?;
                device.blocked = blocked;
                Ok(json!({"mac": mac, "blocked": blocked}))
            }
            (Method::Get, ["api", "control", "status", mac]) => {
                let device = find(&state.devices, mac)?;
                Ok(json!({"mac": device.mac, "blocked": device.blocked}))
            }
            (Method::Get, ["api", "control", "blocked"]) => {
                let blocked: Vec<&str> = state
                    .devices
                    .iter()
                    .filter(|d| d.blocked)
                    .map(|d| d.mac.as_str())
                    .collect();
                Ok(json!({"blocked": blocked, "count": blocked.len()}))
            }
            (Method::Post, ["api", "timers"]) => {
                let mac = body_mac.unwrap_or_default();
                let minutes = request
                    .body
                    .as_ref()
                    .and_then(|b| b.get("minutes"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32;
                let expiry = now + chrono::Duration::minutes(i64::from(minutes));
                state.timers.insert(mac.clone(), (expiry, minutes));
                Ok(json!({"timer": timer_json(&mac, expiry, minutes, now)}))
            }
            (Method::Get, ["api", "timers", mac]) => {
                let timer = state
                    .timers
                    .get(*mac)
                    .map(|(expiry, minutes)| timer_json(mac, *expiry, *minutes, now));
                Ok(json!({ "timer": timer }))
            }
            (Method::Delete, ["api", "timers", mac]) => {
                let cancelled = state.timers.remove(*mac).is_some();
                Ok(json!({"mac": mac, "cancelled": cancelled}))
            }
            (Method::Get, ["api", "timers"]) => {
                let timers: Vec<Value> = state
                    .timers
                    .iter()
                    .map(|(mac, (expiry, minutes))| timer_json(mac, *expiry, *minutes, now))
                    .collect();
                Ok(json!({"timers": timers, "count": timers.len()}))
            }
            _ => Err(ApiError::rejected(
                Some("NOT_FOUND".to_string()),
                Some(format!("No route for {} {}", request.method, request.path)),
            )),
        }
    }
}

fn find<'a>(devices: &'a [Device], mac: &str) -> ApiResult<&'a Device> {
    devices
        .iter()
        .find(|d| d.same_mac(mac))
        .ok_or_else(|| not_found(mac))
}

fn not_found(mac: &str) -> ApiError {
    ApiError::rejected(
        Some("DEVICE_NOT_FOUND".to_string()),
        Some(format!("Device with MAC {} not found", mac)),
    )
}

fn timer_json(mac: &str, expiry: DateTime<Utc>, minutes: u32, now: DateTime<Utc>) -> Value {
    json!({
        "mac": mac,
        "minutes": minutes,
        "expires_at": expiry.to_rfc3339(),
        "remaining_seconds": (expiry - now).num_seconds().max(0),
    })
}

impl Transport for FakeRemote {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, ApiResult<Value>> {
        Box::pin(async move {
            let delay = self.delay_for(&request);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.handle(&request)
        })
    }
}
