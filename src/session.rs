//! Everything needed to watch and act on one device.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;

use crate::api::ApiClient;
use crate::countdown::{Clock, CountdownHandle, CountdownTicker};
use crate::error::MutationError;
use crate::feeds::DeviceDetailSource;
use crate::models::DeviceDetail;
use crate::mutation::{InFlightRegistry, MutationCoordinator, RenameDraft};
use crate::poller::{PollHandle, Poller, Snapshot};

pub struct DeviceSession {
    mac: String,
    detail: Poller<Option<DeviceDetail>>,
    coordinator: MutationCoordinator,
    draft: Mutex<RenameDraft>,
    poll: Option<PollHandle>,
    clock: Arc<dyn Clock>,
}

impl DeviceSession {
    /// Creates the session without polling; call [`DeviceSession::start`] to begin.
    pub fn open(
        api: ApiClient,
        mac: impl Into<String>,
        registry: InFlightRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mac = mac.into();
        let detail = Poller::new(DeviceDetailSource::new(api.clone(), mac.clone()));
        let coordinator = MutationCoordinator::new(mac.clone(), api, detail.clone(), registry);
        Self {
            mac,
            detail,
            coordinator,
            draft: Mutex::new(RenameDraft::default()),
            poll: None,
            clock,
        }
    }

    pub fn mac(&self) -> &str {
        &self.mac
    }

    /// (Re)starts detail polling. A previous loop is cancelled first.
    pub fn start(&mut self, every: Duration) {
        if let Some(previous) = self.poll.take() {
            previous.cancel();
        }
        self.poll = Some(self.detail.start(every));
    }

    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(PollHandle::is_active)
    }

    pub async fn refresh(&self) {
        self.detail.refresh().await;
    }

    pub fn snapshot(&self) -> Snapshot<Option<DeviceDetail>> {
        self.detail.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<Option<DeviceDetail>>> {
        self.detail.subscribe()
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    /// Timers are not offered for blocked devices or devices that already have one.
    pub fn can_set_timer(&self) -> bool {
        self.detail
            .snapshot()
            .data
            .as_ref()
            .is_some_and(DeviceDetail::can_set_timer)
    }

    /// Live countdown for the timer in the current snapshot, if any.
    pub fn countdown(&self) -> Option<CountdownHandle> {
        let expiry = self.detail.snapshot().data?.timer?.expires_at;
        Some(CountdownTicker::start(Some(expiry), Arc::clone(&self.clock)))
    }

    // Rename

    pub fn begin_rename(&self) {
        let name = self.current_name();
        self.lock_draft().begin(name.as_deref());
    }

    pub fn edit_rename(&self, text: &str) {
        self.lock_draft().edit(text);
    }

    pub fn cancel_rename(&self) {
        let name = self.current_name();
        self.lock_draft().cancel(name.as_deref());
    }

    pub fn rename_draft(&self) -> RenameDraft {
        self.lock_draft().clone()
    }

    /// Sends the staged name. The draft stays open on failure so the user can retry.
    pub async fn submit_rename(&self) -> Result<(), MutationError> {
        let text = self.lock_draft().text().to_string();
        self.coordinator.rename(&text).await?;
        self.lock_draft().close();
        Ok(())
    }

    /// Stops polling and drops any fetch result still on its way.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(handle) = self.poll.take() {
            handle.cancel();
        }
        self.detail.shutdown();
    }

    fn current_name(&self) -> Option<String> {
        self.detail.snapshot().data.and_then(|d| d.device.name)
    }

    fn lock_draft(&self) -> MutexGuard<'_, RenameDraft> {
        self.draft.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
