use super::*;
use crate::config::Platform;
use crate::hardware::RecordingTorch;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{advance, sleep, Instant};

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn create_scheduler(platform: Platform) -> (StrobeScheduler, Arc<RecordingTorch>) {
    let torch = Arc::new(RecordingTorch::new());
    let scheduler = StrobeScheduler::new(
        torch.clone(),
        platform,
        PlatformLimits::default(),
        PulseShape::default(),
    );
    (scheduler, torch)
}

/// Offsets of each torch call from `t0`
fn offsets(torch: &RecordingTorch, t0: Instant) -> Vec<(Duration, bool)> {
    torch
        .calls()
        .into_iter()
        .map(|(at, on)| (at.saturating_duration_since(t0), on))
        .collect()
}

fn assert_near(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= ms(1),
        "expected {:?}, got {:?}",
        expected,
        actual
    );
}

async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_turns_torch_on_immediately() {
    let (scheduler, torch) = create_scheduler(Platform::Ios);

    let config = scheduler.start(2.0, false);
    assert_eq!(config.warmup, ms(220));
    assert!(scheduler.is_running());
    assert!(scheduler.is_on());
    assert!(scheduler.warming_up());
    assert_eq!(torch.states(), vec![true]);
}

#[tokio::test(start_paused = true)]
async fn test_phase_loop_follows_grid() {
    let (scheduler, torch) = create_scheduler(Platform::Ios);
    let t0 = Instant::now();
    scheduler.start(2.0, false);

    sleep(ms(1050)).await;

    let calls = offsets(&torch, t0);
    let expected = [(0, true), (300, false), (500, true), (800, false), (1000, true)];
    assert_eq!(calls.len(), expected.len(), "{:?}", calls);
    for ((at, on), (want_at, want_on)) in calls.iter().zip(expected) {
        assert_eq!(*on, want_on);
        assert_near(*at, ms(want_at));
    }
}

#[tokio::test(start_paused = true)]
async fn test_late_timers_do_not_drift() {
    let (scheduler, torch) = create_scheduler(Platform::Ios);
    let t0 = Instant::now();
    scheduler.start(2.0, false);

    // Step the clock in 13ms ticks so every timer fires up to one tick late
    let tick = ms(13);
    for _ in 0..(20_000 / 13) {
        advance(tick).await;
        settle().await;
    }

    let period = ms(500);
    let on_duration = ms(300);
    let calls = offsets(&torch, t0);
    assert!(calls.len() > 70, "only {} toggles", calls.len());

    let mut rising = 0u32;
    for (at, on) in calls.iter().skip(1) {
        let in_period = Duration::from_nanos((at.as_nanos() % period.as_nanos()) as u64);
        if *on {
            rising += 1;
            assert!(in_period <= tick, "rising edge at {:?} is off-grid", at);
            // Rising edge n belongs to period n, however late earlier ones were
            let k = at.as_nanos() / period.as_nanos();
            assert_eq!(k, u128::from(rising));
        } else {
            assert!(
                in_period >= on_duration && in_period - on_duration <= tick,
                "falling edge at {:?} is off-grid",
                at
            );
        }
    }
    assert!(rising >= 35);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let (scheduler, torch) = create_scheduler(Platform::Android);

    scheduler.stop();
    scheduler.stop();
    assert!(!scheduler.is_on());
    assert!(!scheduler.is_running());
    assert_eq!(torch.last_state(), Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_warmup_silences_torch() {
    let (scheduler, torch) = create_scheduler(Platform::Android);
    scheduler.start(6.0, false);

    sleep(ms(100)).await;
    scheduler.stop();
    let after_stop = torch.call_count();
    assert_eq!(torch.states(), vec![true, false]);

    sleep(ms(3000)).await;
    assert_eq!(torch.call_count(), after_stop);
    assert!(!scheduler.is_on());
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_loop_leaves_torch_off() {
    let (scheduler, torch) = create_scheduler(Platform::Ios);
    scheduler.start(2.0, true);

    sleep(ms(650)).await;
    assert!(scheduler.is_on());
    scheduler.stop();
    let after_stop = torch.call_count();

    sleep(ms(2000)).await;
    assert_eq!(torch.call_count(), after_stop);
    assert_eq!(torch.last_state(), Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_restart_cancels_pending_timers() {
    let (scheduler, torch) = create_scheduler(Platform::Ios);
    let t0 = Instant::now();
    scheduler.start(2.0, false);

    sleep(ms(100)).await;
    scheduler.start(2.0, false);

    sleep(ms(350)).await;

    // Second session anchored at 100ms: only its grid shows up
    let calls = offsets(&torch, t0);
    assert_eq!(calls.len(), 3, "{:?}", calls);
    assert!(calls[0].1 && calls[1].1 && !calls[2].1);
    assert_near(calls[1].0, ms(100));
    assert_near(calls[2].0, ms(400));
}

#[tokio::test(start_paused = true)]
async fn test_driver_errors_do_not_break_loop() {
    let (scheduler, torch) = create_scheduler(Platform::Ios);
    torch.set_failing(true);
    scheduler.start(2.0, true);

    sleep(ms(1100)).await;
    assert!(torch.call_count() >= 5);
    assert!(scheduler.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_drop_forces_torch_off() {
    let (scheduler, torch) = create_scheduler(Platform::Ios);
    scheduler.start(4.0, true);
    sleep(ms(50)).await;

    drop(scheduler);
    let after_drop = torch.call_count();
    assert_eq!(torch.last_state(), Some(false));

    sleep(ms(1000)).await;
    assert_eq!(torch.call_count(), after_drop);
}
