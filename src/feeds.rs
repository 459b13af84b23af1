//! The concrete resources the client polls.

use std::time::Duration;

use futures::future::BoxFuture;

use crate::api::ApiClient;
use crate::error::ApiResult;
use crate::models::{Device, DeviceDetail, Timer};
use crate::poller::{PollHandle, Poller, Snapshot, Source};
use tokio::sync::watch;

/// `GET /api/devices`
pub struct DeviceListSource {
    api: ApiClient,
}

impl DeviceListSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

impl Source<Vec<Device>> for DeviceListSource {
    fn name(&self) -> &str {
        "devices"
    }

    fn fetch(&self) -> BoxFuture<'_, ApiResult<Vec<Device>>> {
        Box::pin(self.api.get_devices())
    }
}

/// `GET /api/timers`
pub struct TimerListSource {
    api: ApiClient,
}

impl TimerListSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

impl Source<Vec<Timer>> for TimerListSource {
    fn name(&self) -> &str {
        "timers"
    }

    fn fetch(&self) -> BoxFuture<'_, ApiResult<Vec<Timer>>> {
        Box::pin(self.api.get_all_timers())
    }
}

/// One device plus its timer, fetched together; either failing fails the whole fetch.
pub struct DeviceDetailSource {
    api: ApiClient,
    mac: String,
    label: String,
}

impl DeviceDetailSource {
    pub fn new(api: ApiClient, mac: impl Into<String>) -> Self {
        let mac = mac.into();
        Self {
            label: format!("device {}", mac),
            api,
            mac,
        }
    }
}

impl Source<Option<DeviceDetail>> for DeviceDetailSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn fetch(&self) -> BoxFuture<'_, ApiResult<Option<DeviceDetail>>> {
        Box::pin(async move {
            let (device, timer) =
                futures::try_join!(self.api.get_device(&self.mac), self.api.get_timer(&self.mac))?;
            Ok(Some(DeviceDetail { device, timer }))
        })
    }
}

/// Device list snapshot plus the user-triggered network scan.
#[derive(Clone)]
pub struct DeviceListFeed {
    api: ApiClient,
    poller: Poller<Vec<Device>>,
}

impl DeviceListFeed {
    pub fn new(api: ApiClient) -> Self {
        Self {
            poller: Poller::new(DeviceListSource::new(api.clone())),
            api,
        }
    }

    pub fn start(&self, every: Duration) -> PollHandle {
        self.poller.start(every)
    }

    pub async fn refresh(&self) {
        self.poller.refresh().await;
    }

    /// Asks the remote service to re-discover devices. Never scheduled periodically.
    ///
    /// Returns `false` if the scan's outcome was dropped because a newer fetch had already
    /// been applied.
    pub async fn scan_network(&self) -> bool {
        tracing::info!("Network scan requested");
        let api = self.api.clone();
        let applied = self
            .poller
            .replace_with(async move { api.scan_network().await })
            .await;
        if !applied {
            tracing::warn!("Network scan result superseded by a newer fetch");
        }
        applied
    }

    pub fn snapshot(&self) -> Snapshot<Vec<Device>> {
        self.poller.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<Vec<Device>>> {
        self.poller.subscribe()
    }

    pub fn shutdown(&self) {
        self.poller.shutdown();
    }
}
