use std::sync::Arc;

use anyhow::Result;

use crate::api::ApiClient;
use crate::cli::{parse_cli_args, usage_text, version_text, CliCommand};
use crate::commands::{
    handle_blocked, handle_dashboard, handle_device, handle_devices, handle_health,
    handle_mutation, handle_rename, handle_scan, handle_status, handle_timers, handle_watch,
};
use crate::countdown::{Clock, SystemClock};
use crate::mutation::{InFlightRegistry, Mutation};
use crate::session::DeviceSession;
use crate::settings::SharedSettings;
use crate::transport::{HttpTransport, Transport};

/// Receives every line of command output.
pub type OutputHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Everything a command needs: settings, the API client and where output goes.
#[derive(Clone)]
pub struct AppContext {
    settings: SharedSettings,
    api: ApiClient,
    registry: InFlightRegistry,
    clock: Arc<dyn Clock>,
    output: OutputHook,
}

impl AppContext {
    /// HTTP client configured from the environment, printing to stdout.
    pub fn from_env() -> Self {
        let settings = SharedSettings::from_env();
        let transport = Arc::new(HttpTransport::new(Arc::new(settings.clone())));
        Self {
            settings,
            api: ApiClient::new(transport),
            registry: InFlightRegistry::new(),
            clock: Arc::new(SystemClock),
            output: Arc::new(|line| println!("{}", line)),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.api = ApiClient::new(transport);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_output_hook(mut self, output: OutputHook) -> Self {
        self.output = output;
        self
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn open_session(&self, mac: &str) -> DeviceSession {
        DeviceSession::open(
            self.api.clone(),
            mac,
            self.registry.clone(),
            Arc::clone(&self.clock),
        )
    }

    pub fn emit(&self, line: impl AsRef<str>) {
        (self.output)(line.as_ref());
    }
}

/// Run the app by parsing CLI-style args and dispatching the command.
pub async fn run<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parsed = parse_cli_args(args)?;
    let context = AppContext::from_env();
    if let Some(url) = parsed.api_url.as_deref() {
        context.settings().set_api_url(url);
    }
    if let Some(key) = parsed.api_key.as_deref() {
        context.settings().set_api_key(key);
    }
    execute_command_with_context(parsed.command, &context).await
}

/// Execute a pre-parsed command against `context`.
pub async fn execute_command_with_context(command: CliCommand, context: &AppContext) -> Result<()> {
    match command {
        CliCommand::Help => {
            context.emit(usage_text());
            Ok(())
        }
        CliCommand::Version => {
            context.emit(version_text());
            Ok(())
        }
        CliCommand::Health => handle_health(context).await,
        CliCommand::Devices { search } => handle_devices(context, search.as_deref()).await,
        CliCommand::Scan => handle_scan(context).await,
        CliCommand::Blocked => handle_blocked(context).await,
        CliCommand::Timers => handle_timers(context).await,
        CliCommand::Status { mac } => handle_status(context, &mac).await,
        CliCommand::Device { mac } => handle_device(context, &mac).await,
        CliCommand::Watch { mac, duration } => handle_watch(context, &mac, duration).await,
        CliCommand::Block { mac } => handle_mutation(context, &mac, Mutation::Block).await,
        CliCommand::Unblock { mac } => handle_mutation(context, &mac, Mutation::Unblock).await,
        CliCommand::Timer { mac, minutes } => {
            handle_mutation(context, &mac, Mutation::SetTimer { minutes }).await
        }
        CliCommand::CancelTimer { mac } => {
            handle_mutation(context, &mac, Mutation::CancelTimer).await
        }
        CliCommand::Rename { mac, name } => handle_rename(context, &mac, &name).await,
        CliCommand::Dashboard { watch, duration } => {
            handle_dashboard(context, watch, duration).await
        }
    }
}
