//! User-triggered state changes on a single device.
//!
//! Every mutation is a request/reconcile transaction:
//! `Idle -> InFlight -> Reconciling -> Idle` on success, `Idle -> InFlight -> Idle` on failure.
//! Nothing is changed locally before the server confirms.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, watch};

use crate::api::ApiClient;
use crate::config::{CUSTOM_MINUTES_MAX_DIGITS, NOTIFICATION_CAPACITY};
use crate::error::{ApiError, MutationError};
use crate::models::DeviceDetail;
use crate::poller::Poller;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Block,
    Unblock,
    SetTimer { minutes: u32 },
    CancelTimer,
    Rename { name: String },
}

impl Mutation {
    pub fn label(&self) -> &'static str {
        match self {
            Mutation::Block => "block",
            Mutation::Unblock => "unblock",
            Mutation::SetTimer { .. } => "set-timer",
            Mutation::CancelTimer => "cancel-timer",
            Mutation::Rename { .. } => "rename",
        }
    }

    /// Whether success is followed by a forced re-fetch of the device.
    pub fn needs_resync(&self) -> bool {
        !matches!(self, Mutation::CancelTimer)
    }

    fn success_notice(&self) -> (&'static str, String) {
        match self {
            Mutation::Block => ("Success", "Device has been blocked".to_string()),
            Mutation::Unblock => ("Success", "Device has been unblocked".to_string()),
            Mutation::SetTimer { minutes } => (
                "Timer Set",
                format!("Device will be blocked in {} minutes", minutes),
            ),
            Mutation::CancelTimer => ("Success", "Timer cancelled".to_string()),
            Mutation::Rename { name } => ("Success", format!("Device renamed to {}", name)),
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::SetTimer { minutes } => write!(f, "set-timer({}m)", minutes),
            Mutation::Rename { name } => write!(f, "rename({:?})", name),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MutationState {
    #[default]
    Idle,
    InFlight(Mutation),
    Reconciling(Mutation),
}

impl MutationState {
    /// The acting control surface is disabled whenever this is true.
    pub fn is_busy(&self) -> bool {
        !matches!(self, MutationState::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

/// One-shot message for the user about a finished mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub mac: String,
    pub title: String,
    pub message: String,
}

/// Canonical key for a MAC: upper case, colon separated.
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_uppercase().replace('-', ":")
}

/// Process-wide record of which devices have a mutation in flight.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    inner: Arc<DashMap<String, Mutation>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `mac` for `mutation`; `None` if another mutation already holds it.
    pub fn try_acquire(&self, mac: &str, mutation: &Mutation) -> Option<InFlightSlot> {
        let key = normalize_mac(mac);
        match self.inner.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(mutation.clone());
                Some(InFlightSlot {
                    registry: Arc::clone(&self.inner),
                    key,
                })
            }
        }
    }

    pub fn in_flight(&self, mac: &str) -> Option<Mutation> {
        self.inner.get(&normalize_mac(mac)).map(|m| m.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Releases the device on drop.
pub struct InFlightSlot {
    registry: Arc<DashMap<String, Mutation>>,
    key: String,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.registry.remove(&self.key);
    }
}

/// Puts the coordinator back to Idle however the transaction ends, including cancellation.
struct IdleOnDrop<'a>(&'a watch::Sender<MutationState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(MutationState::Idle);
    }
}

/// Parses a custom duration typed by the user.
pub fn parse_minutes(input: &str) -> Result<u32, ApiError> {
    let digits = input.trim();
    let invalid = || ApiError::Validation("Minutes must be a positive number".to_string());

    if digits.is_empty()
        || digits.len() > CUSTOM_MINUTES_MAX_DIGITS
        || !digits.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    match digits.parse::<u32>() {
        Ok(minutes) if minutes > 0 => Ok(minutes),
        _ => Err(invalid()),
    }
}

fn validate(mutation: &Mutation) -> Result<Mutation, ApiError> {
    match mutation {
        Mutation::SetTimer { minutes: 0 } => Err(ApiError::Validation(
            "Minutes must be a positive number".to_string(),
        )),
        Mutation::Rename { name } => {
            let name = name.trim();
            if name.is_empty() {
                Err(ApiError::Validation("Device name cannot be empty".to_string()))
            } else {
                Ok(Mutation::Rename {
                    name: name.to_string(),
                })
            }
        }
        other => Ok(other.clone()),
    }
}

/// Runs mutations for one device and resyncs its detail snapshot afterwards.
pub struct MutationCoordinator {
    mac: String,
    api: ApiClient,
    detail: Poller<Option<DeviceDetail>>,
    registry: InFlightRegistry,
    state: watch::Sender<MutationState>,
    notifications: broadcast::Sender<Notification>,
}

impl MutationCoordinator {
    pub fn new(
        mac: impl Into<String>,
        api: ApiClient,
        detail: Poller<Option<DeviceDetail>>,
        registry: InFlightRegistry,
    ) -> Self {
        let (state, _) = watch::channel(MutationState::Idle);
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            mac: mac.into(),
            api,
            detail,
            registry,
            state,
            notifications,
        }
    }

    pub fn mac(&self) -> &str {
        &self.mac
    }

    pub fn state(&self) -> MutationState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<MutationState> {
        self.state.subscribe()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub async fn block(&self) -> Result<(), MutationError> {
        self.execute(Mutation::Block).await
    }

    pub async fn unblock(&self) -> Result<(), MutationError> {
        self.execute(Mutation::Unblock).await
    }

    /// Callers must not offer this for a blocked device, see [`DeviceDetail::can_set_timer`].
    pub async fn set_timer(&self, minutes: u32) -> Result<(), MutationError> {
        self.execute(Mutation::SetTimer { minutes }).await
    }

    pub async fn cancel_timer(&self) -> Result<(), MutationError> {
        self.execute(Mutation::CancelTimer).await
    }

    pub async fn rename(&self, name: &str) -> Result<(), MutationError> {
        self.execute(Mutation::Rename {
            name: name.to_string(),
        })
        .await
    }

    pub async fn execute(&self, mutation: Mutation) -> Result<(), MutationError> {
        let mutation = match validate(&mutation) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("[MUTATION] {} on {} rejected: {}", mutation, self.mac, e);
                self.notify(NotificationKind::Error, "Error", e.to_string());
                return Err(e.into());
            }
        };

        let Some(_slot) = self.registry.try_acquire(&self.mac, &mutation) else {
            tracing::debug!("[MUTATION] {} on {} ignored, device busy", mutation, self.mac);
            return Err(MutationError::Busy {
                mac: self.mac.clone(),
            });
        };
        let _idle = IdleOnDrop(&self.state);

        self.state.send_replace(MutationState::InFlight(mutation.clone()));
        tracing::info!("[MUTATION] {} on {}", mutation, self.mac);

        if let Err(e) = self.send(&mutation).await {
            tracing::warn!("[MUTATION] {} on {} failed: {}", mutation, self.mac, e);
            self.state.send_replace(MutationState::Idle);
            self.notify(NotificationKind::Error, "Error", e.to_string());
            return Err(e.into());
        }

        self.state
            .send_replace(MutationState::Reconciling(mutation.clone()));
        if mutation.needs_resync() {
            self.detail.refresh().await;
        } else {
            self.detail.modify(|detail| {
                if let Some(detail) = detail {
                    detail.timer = None;
                }
            });
        }
        self.state.send_replace(MutationState::Idle);

        let (title, message) = mutation.success_notice();
        self.notify(NotificationKind::Success, title, message);
        Ok(())
    }

    async fn send(&self, mutation: &Mutation) -> Result<(), ApiError> {
        match mutation {
            Mutation::Block => self.api.block_device(&self.mac).await.map(|_| ()),
            Mutation::Unblock => self.api.unblock_device(&self.mac).await.map(|_| ()),
            Mutation::SetTimer { minutes } => {
                self.api.set_timer(&self.mac, *minutes).await.map(|_| ())
            }
            Mutation::CancelTimer => self.api.cancel_timer(&self.mac).await.map(|_| ()),
            Mutation::Rename { name } => {
                self.api.set_device_name(&self.mac, name).await.map(|_| ())
            }
        }
    }

    fn notify(&self, kind: NotificationKind, title: &str, message: String) {
        // Nobody listening is fine; the outcome is also returned to the caller.
        let _ = self.notifications.send(Notification {
            kind,
            mac: self.mac.clone(),
            title: title.to_string(),
            message,
        });
    }
}

/// Locally staged device name, only ever trusted once the server has confirmed it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameDraft {
    editing: bool,
    text: String,
}

impl RenameDraft {
    pub fn begin(&mut self, current_name: Option<&str>) {
        self.editing = true;
        self.text = current_name.unwrap_or_default().to_string();
    }

    pub fn edit(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Throws the staged text away and restores the device's name.
    pub fn cancel(&mut self, current_name: Option<&str>) {
        self.editing = false;
        self.text = current_name.unwrap_or_default().to_string();
    }

    pub fn close(&mut self) {
        self.editing = false;
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
