//! Client for a home-network access-control service.
//!
//! Keeps a polled view of devices, blocks and timers in step with the remote service, derives
//! live countdowns from server-issued expiry instants, and runs user-triggered block, unblock,
//! timer and rename requests against that view.

pub mod api;
pub mod app;
pub mod cli;
mod commands;
pub mod config;
pub mod countdown;
pub mod dashboard;
pub mod error;
pub mod feeds;
pub mod logging;
pub mod models;
pub mod mutation;
pub mod poller;
pub mod probe;
pub mod session;
pub mod settings;
pub mod transport;

pub use api::ApiClient;
pub use app::{execute_command_with_context, run, AppContext, OutputHook};
pub use cli::{parse_cli_args, CliArgs, CliCommand};
pub use countdown::{Clock, Countdown, CountdownHandle, CountdownTicker, SystemClock, TokioClock};
pub use dashboard::{Dashboard, DashboardStats, DashboardView, TimerEntry};
pub use error::{ApiError, ApiResult, MutationError};
pub use feeds::{DeviceDetailSource, DeviceListFeed, DeviceListSource, TimerListSource};
pub use models::{Device, DeviceDetail, DeviceStatus, Timer};
pub use mutation::{
    InFlightRegistry, Mutation, MutationCoordinator, MutationState, Notification,
    NotificationKind, RenameDraft,
};
pub use poller::{PollHandle, Poller, Snapshot, Source};
pub use probe::{Connectivity, ConnectivityProbe};
pub use session::DeviceSession;
pub use settings::{Settings, SettingsProvider, SharedSettings};
pub use transport::{ApiRequest, HttpTransport, Method, Transport};
