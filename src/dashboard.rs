//! Home screen: connectivity, device and timer lists and the figures derived from them.

use std::sync::Arc;
use std::time::Duration;

use crate::api::ApiClient;
use crate::config::{DEVICE_LIST_INTERVAL, TIMER_LIST_INTERVAL};
use crate::countdown::{Clock, Countdown};
use crate::feeds::{DeviceListFeed, TimerListSource};
use crate::models::{Device, Timer};
use crate::poller::{PollHandle, Poller};
use crate::probe::{Connectivity, ConnectivityProbe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DashboardStats {
    /// Online and not blocked.
    pub online: usize,
    pub blocked: usize,
    pub active_timers: usize,
}

impl DashboardStats {
    pub fn compute(devices: &[Device], timers: &[Timer]) -> Self {
        Self {
            online: devices.iter().filter(|d| d.online && !d.blocked).count(),
            blocked: devices.iter().filter(|d| d.blocked).count(),
            active_timers: timers.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEntry {
    pub mac: String,
    pub device_name: String,
    pub countdown: Countdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardView {
    /// No health check has finished yet.
    Connecting,
    /// Degraded view: only a retry is offered.
    Unreachable { message: String },
    Ready {
        stats: DashboardStats,
        blocked: Vec<Device>,
        timers: Vec<TimerEntry>,
        loading: bool,
        error: Option<String>,
    },
}

pub struct Dashboard {
    probe: ConnectivityProbe,
    devices: DeviceListFeed,
    timers: Poller<Vec<Timer>>,
    handles: Vec<PollHandle>,
    clock: Arc<dyn Clock>,
}

impl Dashboard {
    pub fn new(api: ApiClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            probe: ConnectivityProbe::new(api.clone()),
            devices: DeviceListFeed::new(api.clone()),
            timers: Poller::new(TimerListSource::new(api)),
            handles: Vec::new(),
            clock,
        }
    }

    /// Checks connectivity, then starts both lists on their default cadences.
    pub async fn start(&mut self) -> Connectivity {
        self.start_with(DEVICE_LIST_INTERVAL, TIMER_LIST_INTERVAL).await
    }

    pub async fn start_with(
        &mut self,
        devices_every: Duration,
        timers_every: Duration,
    ) -> Connectivity {
        let connectivity = self.probe.check().await;
        self.stop();
        self.handles.push(self.devices.start(devices_every));
        self.handles.push(self.timers.start(timers_every));
        connectivity
    }

    /// Cancels both polling loops.
    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.cancel();
        }
    }

    pub fn is_polling(&self) -> bool {
        !self.handles.is_empty() && self.handles.iter().all(PollHandle::is_active)
    }

    pub async fn refresh_all(&self) {
        tokio::join!(
            self.devices.refresh(),
            self.timers.refresh(),
            self.probe.check()
        );
    }

    /// Health check again; when it passes, both lists are fetched straight away.
    pub async fn retry(&self) -> Connectivity {
        let connectivity = self.probe.check().await;
        if connectivity == Connectivity::Reachable {
            tokio::join!(self.devices.refresh(), self.timers.refresh());
        }
        connectivity
    }

    pub fn probe(&self) -> &ConnectivityProbe {
        &self.probe
    }

    pub fn devices(&self) -> &DeviceListFeed {
        &self.devices
    }

    pub fn timers(&self) -> &Poller<Vec<Timer>> {
        &self.timers
    }

    pub fn view(&self) -> DashboardView {
        match self.probe.current() {
            Connectivity::Unknown => DashboardView::Connecting,
            Connectivity::Unreachable { message } => DashboardView::Unreachable { message },
            Connectivity::Reachable => {
                let devices = self.devices.snapshot();
                let timers = self.timers.snapshot();
                let now = self.clock.now();

                let entries = timers
                    .data
                    .iter()
                    .map(|timer| TimerEntry {
                        mac: timer.mac.clone(),
                        device_name: devices
                            .data
                            .iter()
                            .find(|d| d.same_mac(&timer.mac))
                            .map(|d| d.display_name().to_string())
                            .unwrap_or_else(|| timer.mac.clone()),
                        countdown: Countdown::compute(Some(timer.expires_at), now),
                    })
                    .collect();

                DashboardView::Ready {
                    stats: DashboardStats::compute(&devices.data, &timers.data),
                    blocked: devices.data.iter().filter(|d| d.blocked).cloned().collect(),
                    timers: entries,
                    loading: devices.loading || timers.loading,
                    error: devices.error.or(timers.error),
                }
            }
        }
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.stop();
        self.devices.shutdown();
        self.timers.shutdown();
    }
}
