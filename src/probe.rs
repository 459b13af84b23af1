//! Connectivity gate in front of the dashboard.

use tokio::sync::watch;

use crate::api::ApiClient;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Connectivity {
    #[default]
    Unknown,
    Reachable,
    Unreachable { message: String },
}

impl Connectivity {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Connectivity::Unreachable { .. })
    }
}

/// Calls the health endpoint on demand.
///
/// Purely informational: polling loops keep running whatever the probe reports, so they
/// recover on their own as soon as the service comes back.
pub struct ConnectivityProbe {
    api: ApiClient,
    state: watch::Sender<Connectivity>,
}

impl ConnectivityProbe {
    pub fn new(api: ApiClient) -> Self {
        let (state, _) = watch::channel(Connectivity::Unknown);
        Self { api, state }
    }

    pub fn current(&self) -> Connectivity {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    /// One health check. Any failure, rejected or not, counts as unreachable.
    pub async fn check(&self) -> Connectivity {
        let next = match self.api.check_health().await {
            Ok(_) => Connectivity::Reachable,
            Err(e) => {
                tracing::warn!("Health check failed: {}", e);
                Connectivity::Unreachable {
                    message: e.to_string(),
                }
            }
        };

        let previous = self.state.send_replace(next.clone());
        if previous != next {
            tracing::info!("Connectivity: {:?} -> {:?}", previous, next);
        }
        next
    }
}
