mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{device, wall_start, FakeRemote, GOOD_URL, MAC, OTHER_MAC};
use net_curfew::error::UNREACHABLE_MESSAGE;
use net_curfew::{
    ApiClient, Clock, Connectivity, Dashboard, DashboardView, Method, Settings, SettingsProvider,
    SharedSettings, TokioClock,
};

#[tokio::test(start_paused = true)]
async fn wrong_url_recovers_after_settings_change_and_retry() {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::starting_at(wall_start()));
    let settings = SharedSettings::new(Settings::new("http://192.168.1.99:5000", "key"));
    let remote = FakeRemote::behind(
        Arc::clone(&clock),
        vec![device(MAC, "Tablet", true), device(OTHER_MAC, "Laptop", false)],
        Arc::new(settings.clone()),
    );
    let mut dashboard = Dashboard::new(ApiClient::new(remote.clone()), Arc::clone(&clock));

    let connectivity = dashboard
        .start_with(Duration::from_secs(30), Duration::from_secs(30))
        .await;
    assert!(connectivity.is_unreachable());
    assert_eq!(
        dashboard.view(),
        DashboardView::Unreachable {
            message: UNREACHABLE_MESSAGE.to_string()
        }
    );

    // Loops keep running while unreachable; they only record the error.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(dashboard.is_polling());
    let devices = dashboard.devices().snapshot();
    assert!(devices.data.is_empty());
    assert_eq!(devices.error.as_deref(), Some(UNREACHABLE_MESSAGE));

    settings.set_api_url("http://192.168.100.16:5000/");
    assert_eq!(settings.current().api_url, GOOD_URL);

    assert_eq!(dashboard.retry().await, Connectivity::Reachable);
    let DashboardView::Ready { stats, error, .. } = dashboard.view() else {
        panic!("expected the ready view after retry");
    };
    assert_eq!(stats.online, 1);
    assert_eq!(error, None);

    // The periodic loop, never restarted, now succeeds on its own.
    let applied = dashboard.devices().snapshot().sequence;
    let polled = remote.count(Method::Get, "/api/devices");
    tokio::time::sleep(Duration::from_secs(31)).await;
    let devices = dashboard.devices().snapshot();
    assert!(devices.sequence > applied);
    assert_eq!(devices.error, None);
    assert_eq!(devices.data.len(), 2);
    assert!(remote.count(Method::Get, "/api/devices") > polled);
    assert!(dashboard.is_polling());
}

#[tokio::test(start_paused = true)]
async fn refresh_all_updates_probe_and_lists_together() {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::starting_at(wall_start()));
    let remote = FakeRemote::new(Arc::clone(&clock), vec![device(MAC, "Tablet", true)]);
    let api = ApiClient::new(remote.clone());
    api.block_device(MAC).await.unwrap();

    let dashboard = Dashboard::new(api, clock);
    dashboard.refresh_all().await;

    let DashboardView::Ready {
        stats,
        blocked,
        loading,
        ..
    } = dashboard.view()
    else {
        panic!("expected the ready view");
    };
    assert_eq!(stats.online, 0);
    assert_eq!(stats.blocked, 1);
    assert_eq!(blocked[0].mac, MAC);
    assert!(!loading);
    assert_eq!(remote.count(Method::Get, "/api/health"), 1);
    assert_eq!(remote.count(Method::Get, "/api/timers"), 1);
}
