use super::*;
use crate::config::{Platform, SirenConfig};
use crate::cover::CoverPhase;
use crate::error::{SirenError, TorchError};
use crate::events::{EventBus, SirenEvent, Subscription};
use crate::hardware::{AlertCall, RecordingAlerts, RecordingTorch, SimulatedCamera};
use crate::trigger::{Activation, TapTrigger};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

struct Harness {
    session: SirenSession,
    bus: Arc<EventBus>,
    torch: Arc<RecordingTorch>,
    alerts: Arc<RecordingAlerts>,
    events: Arc<Mutex<Vec<SirenEvent>>>,
    _recorder: Subscription,
}

fn create_test_config() -> SirenConfig {
    let mut config = SirenConfig::default();
    config.strobe.platform = Platform::Ios;
    config.strobe.frequency_hz = 2.0;
    config
}

fn harness_with(config: SirenConfig, camera: SimulatedCamera, alerts: RecordingAlerts) -> Harness {
    let bus = Arc::new(EventBus::new(16));
    let torch = Arc::new(RecordingTorch::new());
    let alerts = Arc::new(alerts);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let recorder = bus.subscribe(move |event| sink.lock().push(event));

    let session = SirenSession::new(
        config,
        Arc::clone(&bus),
        torch.clone(),
        Arc::new(camera),
        alerts.clone(),
    );

    Harness {
        session,
        bus,
        torch,
        alerts,
        events,
        _recorder: recorder,
    }
}

fn harness(granted: bool) -> Harness {
    harness_with(
        create_test_config(),
        SimulatedCamera::new(granted),
        RecordingAlerts::new(),
    )
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[tokio::test(start_paused = true)]
async fn test_open_publishes_lifecycle_and_starts_alerts() {
    let h = harness(true);
    h.session.open().await.unwrap();

    assert_eq!(*h.events.lock(), vec![SirenEvent::Opening, SirenEvent::Open]);
    assert_eq!(h.session.lifecycle(), Lifecycle::Open);
    assert!(h.session.session_id().is_some());

    let status = h.session.status();
    assert!(status.open);
    assert!(status.cover_visible);
    assert!(!status.strobing);
    assert!(!status.screen_flash);
    // Strobe waits for the camera
    assert_eq!(h.torch.call_count(), 0);

    assert_eq!(
        h.alerts.calls(),
        vec![
            AlertCall::StartAlert,
            AlertCall::StartVibration(vec![ms(0), ms(500), ms(300)]),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_camera_ready_starts_primed_strobe() {
    let h = harness(true);
    h.session.open().await.unwrap();
    h.session.on_camera_ready();

    let config = h.session.strobe_config().unwrap();
    assert_eq!(config.warmup, ms(120));
    assert_eq!(config.frequency_hz, 2.0);

    let status = h.session.status();
    assert!(status.strobing);
    assert!(status.torch_on);
    assert!(!status.cover_visible);
    assert_eq!(h.events.lock().last(), Some(&SirenEvent::CameraReady));

    sleep(ms(1100)).await;
    assert_eq!(h.torch.states(), vec![true, false, true, false, true]);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_ready_is_ignored() {
    let h = harness(true);
    h.session.open().await.unwrap();
    h.session.on_camera_ready();
    h.session.on_camera_ready();

    let ready_count = h
        .events
        .lock()
        .iter()
        .filter(|e| **e == SirenEvent::CameraReady)
        .count();
    assert_eq!(ready_count, 1);
    assert_eq!(h.torch.states(), vec![true]);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_uses_screen_flash() {
    let h = harness(false);
    h.session.open().await.unwrap();

    let status = h.session.status();
    assert!(status.open);
    assert!(status.screen_flash);

    h.session.on_camera_ready();
    assert!(!h.session.start());
    sleep(ms(1000)).await;

    assert_eq!(h.torch.call_count(), 0);
    assert!(!h.session.status().strobing);
}

#[tokio::test(start_paused = true)]
async fn test_mount_error_disables_until_manual_retry() {
    let h = harness(true);
    h.session.open().await.unwrap();
    h.session.on_camera_ready();
    sleep(ms(600)).await;

    h.session
        .on_mount_error(SirenError::Hardware(TorchError::Unavailable));
    let status = h.session.status();
    assert!(!status.strobing);
    assert!(!status.torch_on);
    assert!(status.screen_flash);
    assert_eq!(h.torch.last_state(), Some(false));

    let after_error = h.torch.call_count();
    sleep(ms(2000)).await;
    assert_eq!(h.torch.call_count(), after_error);

    // Manual retry through the toggle control
    assert!(h.session.toggle());
    assert!(h.session.status().strobing);
    assert!(!h.session.status().screen_flash);
}

#[tokio::test(start_paused = true)]
async fn test_background_pauses_and_foreground_resumes() {
    let h = harness(true);
    h.session.open().await.unwrap();
    h.session.on_camera_ready();
    sleep(ms(300)).await;

    h.session.on_app_state(AppState::Background);
    assert!(!h.session.is_strobing());
    assert_eq!(h.torch.last_state(), Some(false));

    let while_backgrounded = h.torch.call_count();
    sleep(ms(2000)).await;
    assert_eq!(h.torch.call_count(), while_backgrounded);

    h.session.on_app_state(AppState::Active);
    assert!(h.session.is_strobing());
    assert_eq!(h.torch.last_state(), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_foreground_respects_user_disable() {
    let h = harness(true);
    h.session.open().await.unwrap();
    h.session.on_camera_ready();

    h.session.stop();
    assert_eq!(h.torch.last_state(), Some(false));

    h.session.on_app_state(AppState::Background);
    h.session.on_app_state(AppState::Active);
    assert!(!h.session.is_strobing());
    assert!(!h.session.status().strobing);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_off_leaves_torch_off() {
    let h = harness(true);
    h.session.open().await.unwrap();
    h.session.on_camera_ready();
    sleep(ms(550)).await;
    assert!(h.session.status().torch_on);

    assert!(!h.session.toggle());
    assert!(!h.session.status().torch_on);
    assert_eq!(h.torch.last_state(), Some(false));

    assert!(h.session.toggle());
    assert!(h.session.status().torch_on);
}

#[tokio::test(start_paused = true)]
async fn test_failsafe_hides_cover_once() {
    let h = harness(true);
    h.session.open().await.unwrap();

    sleep(ms(1601)).await;
    assert!(!h.session.status().cover_visible);
    assert_eq!(h.session.cover().fades_started(), 1);

    // Late readiness still starts the strobe but does not fade again
    h.session.on_camera_ready();
    assert_eq!(h.session.cover().fades_started(), 1);
    assert!(h.session.is_strobing());
}

#[tokio::test(start_paused = true)]
async fn test_teardown_during_warmup_silences_torch() {
    let h = harness(true);
    h.session.open().await.unwrap();
    h.session.on_camera_ready();

    sleep(ms(60)).await;
    h.session.close().await.unwrap();

    let after_close = h.torch.call_count();
    assert_eq!(h.torch.last_state(), Some(false));

    sleep(ms(5000)).await;
    assert_eq!(h.torch.call_count(), after_close);

    let status = h.session.status();
    assert!(!status.open);
    assert!(!status.torch_on);
    assert!(!status.cover_visible);
    assert_eq!(h.events.lock().last(), Some(&SirenEvent::Closed));

    let calls = h.alerts.calls();
    assert!(calls.ends_with(&[AlertCall::StopAlert, AlertCall::StopVibration]));
}

#[tokio::test(start_paused = true)]
async fn test_callbacks_after_close_are_noops() {
    let h = harness(true);
    h.session.open().await.unwrap();
    h.session.close().await.unwrap();
    let events_before = h.events.lock().len();

    h.session.on_camera_ready();
    h.session
        .on_mount_error(SirenError::Hardware(TorchError::Unavailable));
    assert!(!h.session.start());

    sleep(ms(3000)).await;
    assert_eq!(h.events.lock().len(), events_before);
    assert!(h.torch.states().iter().all(|on| !on));

    // Closing twice publishes nothing further
    h.session.close().await.unwrap();
    assert_eq!(h.events.lock().len(), events_before);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_gated_by_session() {
    let h = harness(true);
    let trigger = TapTrigger::new(&SirenConfig::default().trigger, &h.bus);

    assert_eq!(trigger.request_activation(), Activation::Accepted);
    h.session.open().await.unwrap();
    assert_eq!(trigger.request_activation(), Activation::Suppressed);

    h.session.close().await.unwrap();
    assert_eq!(trigger.request_activation(), Activation::Accepted);
}

#[tokio::test(start_paused = true)]
async fn test_open_twice_is_ignored() {
    let h = harness(true);
    h.session.open().await.unwrap();
    let id = h.session.session_id();

    h.session.open().await.unwrap();
    assert_eq!(h.session.session_id(), id);
    assert_eq!(*h.events.lock(), vec![SirenEvent::Opening, SirenEvent::Open]);
}

#[tokio::test(start_paused = true)]
async fn test_alert_failure_is_not_fatal() {
    let h = harness_with(
        create_test_config(),
        SimulatedCamera::new(true),
        RecordingAlerts::failing_start(),
    );
    h.session.open().await.unwrap();
    h.session.on_camera_ready();

    assert!(h.session.status().open);
    assert!(h.session.is_strobing());
}

#[tokio::test(start_paused = true)]
async fn test_reopen_after_close_starts_fresh() {
    let h = harness(true);
    h.session.open().await.unwrap();
    let first = h.session.session_id();
    h.session.on_camera_ready();
    h.session.close().await.unwrap();

    h.session.open().await.unwrap();
    assert_ne!(h.session.session_id(), first);
    assert!(h.session.status().cover_visible);
    // Readiness is per session
    assert!(!h.session.is_strobing());
    h.session.on_camera_ready();
    assert!(h.session.is_strobing());
}

#[tokio::test(start_paused = true)]
async fn test_watch_reports_torch_changes() {
    let h = harness(true);
    let mut status = h.session.watch();
    h.session.open().await.unwrap();
    h.session.on_camera_ready();

    status.changed().await.unwrap();
    assert!(status.borrow_and_update().open);

    sleep(ms(310)).await;
    assert!(!status.borrow().torch_on);
}

#[tokio::test(start_paused = true)]
async fn test_close_while_alerts_start_leaves_hardware_silent() {
    let h = harness_with(
        create_test_config(),
        SimulatedCamera::new(true),
        RecordingAlerts::slow_start(ms(100)),
    );

    let (opened, closed) = tokio::join!(h.session.open(), async {
        sleep(ms(50)).await;
        h.session.close().await
    });
    opened.unwrap();
    closed.unwrap();

    assert_eq!(h.session.lifecycle(), Lifecycle::Closed);
    let calls = h.alerts.calls();
    assert!(calls.ends_with(&[AlertCall::StopAlert, AlertCall::StopVibration]));
    assert!(calls.contains(&AlertCall::StartAlert));

    let cover = h.session.cover().state();
    assert_eq!(cover.phase, CoverPhase::Hidden);
    assert!(!h.session.status().cover_visible);

    sleep(ms(2000)).await;
    assert_eq!(h.session.cover().fades_started(), 0);
    assert!(h.torch.states().iter().all(|on| !on));
    assert_eq!(*h.events.lock(), vec![SirenEvent::Opening, SirenEvent::Closed]);
}

#[tokio::test(start_paused = true)]
async fn test_close_during_permission_prompt_never_opens() {
    let h = harness_with(
        create_test_config(),
        SimulatedCamera::new(true).with_prompt_delay(ms(200)),
        RecordingAlerts::new(),
    );

    let (opened, closed) = tokio::join!(h.session.open(), async {
        sleep(ms(100)).await;
        h.session.close().await
    });
    opened.unwrap();
    closed.unwrap();

    assert_eq!(h.session.lifecycle(), Lifecycle::Closed);
    assert!(!h.session.status().open);
    h.session.on_camera_ready();

    sleep(ms(2000)).await;
    assert_eq!(h.session.cover().fades_started(), 0);
    assert!(h.torch.states().iter().all(|on| !on));
    assert_eq!(*h.events.lock(), vec![SirenEvent::Opening, SirenEvent::Closed]);
}

#[tokio::test(start_paused = true)]
async fn test_status_shows_torch_off_when_driver_rejects_stop() {
    let h = harness(true);
    h.session.open().await.unwrap();
    h.session.on_camera_ready();
    assert!(h.session.status().torch_on);

    h.torch.set_failing(true);
    h.session.stop();

    let status = h.session.status();
    assert!(!status.strobing);
    assert!(!status.torch_on);
    assert_eq!(h.torch.last_state(), Some(false));
}
