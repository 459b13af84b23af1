//! Typed endpoints of the remote access-control service.

use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::models::{
    BlockStatus, BlockedList, CancelResult, Device, DeviceList, DevicePayload, RenameResult,
    Timer, TimerList, TimerPayload,
};
use crate::settings::SettingsProvider;
use crate::transport::{ApiRequest, HttpTransport, Transport};

/// Characters left alone by a path-segment encoder compatible with `encodeURIComponent`.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_segment(raw: &str) -> String {
    utf8_percent_encode(raw, PATH_SEGMENT).to_string()
}

fn decode<T: DeserializeOwned>(data: Value) -> ApiResult<T> {
    serde_json::from_value(data).map_err(ApiError::from)
}

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Client over HTTP, reading base URL and API key from `settings` on every call.
    pub fn http(settings: Arc<dyn SettingsProvider>) -> Self {
        Self::new(Arc::new(HttpTransport::new(settings)))
    }

    async fn call(&self, request: ApiRequest) -> ApiResult<Value> {
        self.transport.send(request).await
    }

    // Health

    pub async fn check_health(&self) -> ApiResult<Value> {
        self.call(ApiRequest::get("/api/health")).await
    }

    // Devices

    pub async fn get_devices(&self) -> ApiResult<Vec<Device>> {
        let list: DeviceList = decode(self.call(ApiRequest::get("/api/devices")).await?)?;
        Ok(list.devices)
    }

    pub async fn get_device(&self, mac: &str) -> ApiResult<Device> {
        let path = format!("/api/devices/{}", encode_segment(mac));
        let payload: DevicePayload = decode(self.call(ApiRequest::get(path)).await?)?;
        Ok(payload.device)
    }

    pub async fn set_device_name(&self, mac: &str, name: &str) -> ApiResult<RenameResult> {
        let path = format!("/api/devices/{}/name", encode_segment(mac));
        decode(self.call(ApiRequest::put(path, json!({ "name": name }))).await?)
    }

    /// Active re-discovery; slower than [`ApiClient::get_devices`].
    pub async fn scan_network(&self) -> ApiResult<Vec<Device>> {
        let list: DeviceList = decode(self.call(ApiRequest::get("/api/scan")).await?)?;
        Ok(list.devices)
    }

    // Control

    pub async fn block_device(&self, mac: &str) -> ApiResult<BlockStatus> {
        let request = ApiRequest::post("/api/control/block", json!({ "mac": mac }));
        decode(self.call(request).await?)
    }

    pub async fn unblock_device(&self, mac: &str) -> ApiResult<BlockStatus> {
        let request = ApiRequest::post("/api/control/unblock", json!({ "mac": mac }));
        decode(self.call(request).await?)
    }

    pub async fn get_block_status(&self, mac: &str) -> ApiResult<BlockStatus> {
        let path = format!("/api/control/status/{}", encode_segment(mac));
        decode(self.call(ApiRequest::get(path)).await?)
    }

    pub async fn get_blocked_devices(&self) -> ApiResult<BlockedList> {
        decode(self.call(ApiRequest::get("/api/control/blocked")).await?)
    }

    // Timers

    pub async fn set_timer(&self, mac: &str, minutes: u32) -> ApiResult<Timer> {
        let request = ApiRequest::post("/api/timers", json!({ "mac": mac, "minutes": minutes }));
        let payload: TimerPayload = decode(self.call(request).await?)?;
        payload
            .timer
            .ok_or_else(|| ApiError::InvalidResponse("set timer response has no timer".into()))
    }

    pub async fn get_timer(&self, mac: &str) -> ApiResult<Option<Timer>> {
        let path = format!("/api/timers/{}", encode_segment(mac));
        let payload: TimerPayload = decode(self.call(ApiRequest::get(path)).await?)?;
        Ok(payload.timer)
    }

    pub async fn cancel_timer(&self, mac: &str) -> ApiResult<CancelResult> {
        let path = format!("/api/timers/{}", encode_segment(mac));
        decode(self.call(ApiRequest::delete(path)).await?)
    }

    pub async fn get_all_timers(&self) -> ApiResult<Vec<Timer>> {
        let list: TimerList = decode(self.call(ApiRequest::get("/api/timers")).await?)?;
        Ok(list.timers)
    }
}
