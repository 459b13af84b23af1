//! Command handlers behind the CLI. Output is plain text, one line per call to `emit`.

use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::watch;

use crate::app::AppContext;
use crate::config::{DEVICE_DETAIL_INTERVAL, DEVICE_LIST_INTERVAL, ENV_API_URL};
use crate::countdown::{Countdown, CountdownHandle};
use crate::dashboard::{Dashboard, DashboardView, TimerEntry};
use crate::feeds::DeviceListFeed;
use crate::models::{filter_devices, Device, DeviceDetail};
use crate::mutation::{Mutation, NotificationKind};
use crate::probe::{Connectivity, ConnectivityProbe};
use crate::settings::SettingsProvider;

fn device_line(device: &Device) -> String {
    let mut line = format!(
        "{:<8} {}  {}",
        device.status().as_str(),
        device.mac,
        device.display_name()
    );
    if let Some(ip) = device.display_ip() {
        line.push_str(&format!("  {}", ip));
    }
    if let Some(vendor) = device.display_vendor() {
        line.push_str(&format!("  [{}]", vendor));
    }
    line
}

fn countdown_text(countdown: &Countdown) -> String {
    if countdown.is_expired {
        "expired, waiting for the server to block".to_string()
    } else if countdown.is_low() {
        format!("{} remaining (almost up)", countdown.formatted)
    } else {
        format!("{} remaining", countdown.formatted)
    }
}

fn detail_lines(context: &AppContext, detail: &DeviceDetail) -> Vec<String> {
    let device = &detail.device;
    let mut lines = vec![
        format!("{} ({})", device.display_name(), device.mac),
        format!("  Status: {}", device.status().as_str()),
    ];
    if let Some(ip) = device.display_ip() {
        lines.push(format!("  IP: {}", ip));
    }
    if let Some(vendor) = device.display_vendor() {
        lines.push(format!("  Vendor: {}", vendor));
    }
    match &detail.timer {
        Some(timer) => {
            let countdown = Countdown::compute(Some(timer.expires_at), context.clock().now());
            lines.push(format!("  Time limit: {}", countdown_text(&countdown)));
        }
        None => lines.push("  Time limit: none".to_string()),
    }
    lines
}

fn timer_line(entry: &TimerEntry) -> String {
    format!(
        "{}  ({})  {}",
        entry.device_name,
        entry.mac,
        countdown_text(&entry.countdown)
    )
}

fn render_dashboard(context: &AppContext, view: &DashboardView) {
    match view {
        DashboardView::Connecting => context.emit("Connecting..."),
        DashboardView::Unreachable { message } => {
            context.emit(message);
            context.emit(format!(
                "Server: {} (change it with --url or {})",
                context.settings().current().api_url,
                ENV_API_URL
            ));
        }
        DashboardView::Ready {
            stats,
            blocked,
            timers,
            loading,
            error,
        } => {
            context.emit(format!(
                "Online: {}  Blocked: {}  Timers: {}{}",
                stats.online,
                stats.blocked,
                stats.active_timers,
                if *loading { "  (refreshing)" } else { "" }
            ));
            if let Some(error) = error {
                context.emit(format!("Last refresh failed: {}", error));
            }
            if !blocked.is_empty() {
                context.emit("Blocked devices:");
                for device in blocked {
                    context.emit(format!("  {}  {}", device.mac, device.display_name()));
                }
            }
            if !timers.is_empty() {
                context.emit("Active timers:");
                for entry in timers {
                    context.emit(format!("  {}", timer_line(entry)));
                }
            }
        }
    }
}

/// Resolves after `duration`, or on Ctrl-C when no duration is given.
async fn stop_signal(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

async fn next_countdown(rx: &mut Option<watch::Receiver<Countdown>>) -> Option<Countdown> {
    let Some(receiver) = rx.as_mut() else {
        return std::future::pending().await;
    };
    if receiver.changed().await.is_ok() {
        return Some(receiver.borrow_and_update().clone());
    }
    *rx = None;
    None
}

pub(crate) async fn handle_health(context: &AppContext) -> Result<()> {
    let probe = ConnectivityProbe::new(context.api().clone());
    let url = context.settings().current().api_url;
    match probe.check().await {
        Connectivity::Unreachable { message } => bail!(message),
        _ => {
            context.emit(format!("Server at {} is reachable", url));
            Ok(())
        }
    }
}

async fn load_devices(context: &AppContext) -> Result<Vec<Device>> {
    let feed = DeviceListFeed::new(context.api().clone());
    feed.refresh().await;
    let snapshot = feed.snapshot();
    feed.shutdown();
    match snapshot.error {
        Some(error) => bail!(error),
        None => Ok(snapshot.data),
    }
}

pub(crate) async fn handle_devices(context: &AppContext, search: Option<&str>) -> Result<()> {
    let devices = load_devices(context).await?;

    let shown = filter_devices(&devices, search.unwrap_or_default());
    for device in &shown {
        context.emit(device_line(device));
    }
    context.emit(format!("{} of {} device(s)", shown.len(), devices.len()));
    Ok(())
}

pub(crate) async fn handle_scan(context: &AppContext) -> Result<()> {
    context.emit("Scanning network...");
    let feed = DeviceListFeed::new(context.api().clone());
    let applied = feed.scan_network().await;
    let snapshot = feed.snapshot();
    feed.shutdown();

    if !applied {
        bail!("Scan result was superseded by a newer refresh; run the scan again");
    }
    if let Some(error) = snapshot.error {
        bail!(error);
    }

    for device in &snapshot.data {
        context.emit(device_line(device));
    }
    context.emit(format!("Found {} device(s)", snapshot.data.len()));
    Ok(())
}

pub(crate) async fn handle_blocked(context: &AppContext) -> Result<()> {
    let blocked = context.api().get_blocked_devices().await?;
    for mac in &blocked.blocked {
        context.emit(mac);
    }
    context.emit(format!("{} blocked device(s)", blocked.blocked.len()));
    Ok(())
}

pub(crate) async fn handle_timers(context: &AppContext) -> Result<()> {
    let api = context.api();
    let (timers, devices) = tokio::try_join!(api.get_all_timers(), api.get_devices())?;
    let now = context.clock().now();

    for timer in &timers {
        let device_name = devices
            .iter()
            .find(|d| d.same_mac(&timer.mac))
            .map(|d| d.display_name().to_string())
            .unwrap_or_else(|| timer.mac.clone());
        context.emit(timer_line(&TimerEntry {
            mac: timer.mac.clone(),
            device_name,
            countdown: Countdown::compute(Some(timer.expires_at), now),
        }));
    }
    context.emit(format!("{} active timer(s)", timers.len()));
    Ok(())
}

pub(crate) async fn handle_status(context: &AppContext, mac: &str) -> Result<()> {
    let status = context.api().get_block_status(mac).await?;
    let state = if status.blocked { "blocked" } else { "not blocked" };
    context.emit(format!("{}: {}", status.mac, state));
    Ok(())
}

pub(crate) async fn handle_device(context: &AppContext, mac: &str) -> Result<()> {
    let session = context.open_session(mac);
    session.refresh().await;
    let snapshot = session.snapshot();
    session.close();

    if let Some(error) = snapshot.error {
        bail!(error);
    }
    if let Some(detail) = snapshot.data {
        for line in detail_lines(context, &detail) {
            context.emit(line);
        }
    }
    Ok(())
}

pub(crate) async fn handle_watch(
    context: &AppContext,
    mac: &str,
    duration: Option<Duration>,
) -> Result<()> {
    let mut session = context.open_session(mac);
    let mut snapshots = session.subscribe();
    session.start(DEVICE_DETAIL_INTERVAL);

    let mut countdown: Option<CountdownHandle> = None;
    let mut ticks: Option<watch::Receiver<Countdown>> = None;
    let mut shown_expiry = None;

    let stop = stop_signal(duration);
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.loading {
                    continue;
                }
                if let Some(error) = &snapshot.error {
                    context.emit(format!("Refresh failed: {}", error));
                    continue;
                }
                let Some(detail) = snapshot.data else { continue };
                for line in detail_lines(context, &detail) {
                    context.emit(line);
                }

                let expiry = detail.timer.as_ref().map(|t| t.expires_at);
                if expiry != shown_expiry {
                    shown_expiry = expiry;
                    countdown = session.countdown();
                    ticks = countdown.as_ref().map(CountdownHandle::subscribe);
                }
            }
            Some(tick) = next_countdown(&mut ticks) => {
                context.emit(format!("  Time limit: {}", countdown_text(&tick)));
            }
        }
    }

    drop(countdown);
    session.close();
    Ok(())
}

pub(crate) async fn handle_mutation(
    context: &AppContext,
    mac: &str,
    mutation: Mutation,
) -> Result<()> {
    let session = context.open_session(mac);

    if matches!(mutation, Mutation::SetTimer { .. }) {
        session.refresh().await;
        let snapshot = session.snapshot();
        if let Some(error) = snapshot.error {
            bail!(error);
        }
        match snapshot.data {
            Some(detail) if detail.device.blocked => {
                bail!("Device is blocked; unblock it before setting a time limit")
            }
            Some(detail) if detail.timer.is_some() => {
                bail!("Device already has a time limit; cancel it first")
            }
            _ => {}
        }
    }

    let mut notifications = session.coordinator().subscribe_notifications();
    let result = session.coordinator().execute(mutation).await;

    while let Ok(note) = notifications.try_recv() {
        if note.kind == NotificationKind::Success {
            context.emit(format!("{}: {}", note.title, note.message));
        }
    }
    result?;

    if let Some(detail) = session.snapshot().data {
        for line in detail_lines(context, &detail) {
            context.emit(line);
        }
    }
    session.close();
    Ok(())
}

pub(crate) async fn handle_rename(context: &AppContext, mac: &str, name: &str) -> Result<()> {
    let session = context.open_session(mac);
    session.refresh().await;
    session.begin_rename();
    session.edit_rename(name);

    let mut notifications = session.coordinator().subscribe_notifications();
    session.submit_rename().await?;
    while let Ok(note) = notifications.try_recv() {
        context.emit(format!("{}: {}", note.title, note.message));
    }
    session.close();
    Ok(())
}

pub(crate) async fn handle_dashboard(
    context: &AppContext,
    watch: bool,
    duration: Option<Duration>,
) -> Result<()> {
    let mut dashboard = Dashboard::new(context.api().clone(), context.clock());

    if !watch {
        dashboard.refresh_all().await;
        let view = dashboard.view();
        render_dashboard(context, &view);
        if let DashboardView::Unreachable { message } = view {
            bail!(message);
        }
        return Ok(());
    }

    let mut devices = dashboard.devices().subscribe();
    let mut timers = dashboard.timers().subscribe();
    dashboard.start().await;

    let mut retry = tokio::time::interval(DEVICE_LIST_INTERVAL);
    retry.reset();

    let stop = stop_signal(duration);
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = retry.tick() => {
                if dashboard.probe().current().is_unreachable() {
                    dashboard.retry().await;
                    render_dashboard(context, &dashboard.view());
                }
            }
            changed = devices.changed() => {
                if changed.is_err() {
                    break;
                }
                devices.borrow_and_update();
                render_dashboard(context, &dashboard.view());
            }
            changed = timers.changed() => {
                if changed.is_err() {
                    break;
                }
                timers.borrow_and_update();
                render_dashboard(context, &dashboard.view());
            }
        }
    }

    dashboard.stop();
    Ok(())
}
