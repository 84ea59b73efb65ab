use super::phase::{next_boundary, PlatformLimits, PulseShape, StrobeConfig, StrobePhase};
use crate::config::Platform;
use crate::hardware::TorchDriver;
use crate::timer::TimerSlot;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Drives the torch on a fixed phase grid using one-shot timers
pub struct StrobeScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<StrobeState>,
    torch: Arc<dyn TorchDriver>,
    platform: Platform,
    limits: PlatformLimits,
    pulse: PulseShape,
}

struct StrobeState {
    config: Option<StrobeConfig>,
    phase: Option<StrobePhase>,
    warmup: TimerSlot,
    phase_loop: TimerSlot,
    toggles: u64,
}

impl StrobeScheduler {
    pub fn new(
        torch: Arc<dyn TorchDriver>,
        platform: Platform,
        limits: PlatformLimits,
        pulse: PulseShape,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(StrobeState {
                    config: None,
                    phase: None,
                    warmup: TimerSlot::new("strobe_warmup"),
                    phase_loop: TimerSlot::new("strobe_phase"),
                    toggles: 0,
                }),
                torch,
                platform,
                limits,
                pulse,
            }),
        }
    }

    /// Start (or restart) strobing. The torch goes on immediately; the phase
    /// loop begins once the warm-up delay has passed.
    pub fn start(&self, requested_hz: f64, primed: bool) -> StrobeConfig {
        let mut state = self.inner.state.lock();
        state.warmup.clear();
        state.phase_loop.clear();

        let config = StrobeConfig::derive(
            requested_hz,
            primed,
            self.inner.platform,
            &self.inner.limits,
            &self.inner.pulse,
        );
        if config.frequency_hz < requested_hz {
            debug!(
                "Clamped strobe from {:.2} Hz to {:.2} Hz for {:?}",
                requested_hz, config.frequency_hz, self.inner.platform
            );
        }

        state.config = Some(config);
        state.phase = Some(StrobePhase {
            base: Instant::now(),
            is_on: true,
        });
        self.inner.notify(&mut state, true);

        let weak = Arc::downgrade(&self.inner);
        state
            .warmup
            .arm(config.warmup, move |epoch| Inner::on_warmup(&weak, epoch));

        info!(
            "Strobe started at {:.2} Hz (period {:.1}ms, on {:.1}ms, warm-up {:?})",
            config.frequency_hz,
            config.period_ms(),
            config.on_duration_ms(),
            config.warmup
        );
        config
    }

    /// Cancel all pending strobe timers and force the torch off
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        state.warmup.clear();
        state.phase_loop.clear();

        let was_running = state.config.take().is_some();
        state.phase = None;
        self.inner.notify(&mut state, false);

        if was_running {
            info!("Strobe stopped after {} toggles", state.toggles);
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().config.is_some()
    }

    pub fn is_on(&self) -> bool {
        self.inner
            .state
            .lock()
            .phase
            .map(|phase| phase.is_on)
            .unwrap_or(false)
    }

    pub fn config(&self) -> Option<StrobeConfig> {
        self.inner.state.lock().config
    }

    pub fn phase(&self) -> Option<StrobePhase> {
        self.inner.state.lock().phase
    }

    /// Whether the warm-up delay is still pending
    pub fn warming_up(&self) -> bool {
        self.inner.state.lock().warmup.is_armed()
    }

    pub fn platform(&self) -> Platform {
        self.inner.platform
    }
}

impl Drop for StrobeScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

impl Inner {
    fn notify(&self, state: &mut StrobeState, on: bool) {
        state.toggles += 1;
        if let Err(e) = self.torch.set_torch(on) {
            warn!("{} rejected torch {}: {}", self.torch.name(), on, e);
        }
    }

    fn on_warmup(weak: &Weak<Inner>, epoch: u64) {
        let Some(inner) = weak.upgrade() else { return };
        let mut state = inner.state.lock();
        if !state.warmup.complete(epoch) {
            return;
        }
        debug!("Strobe warm-up complete, entering phase loop");
        Inner::schedule_next(&inner, &mut state);
    }

    fn on_boundary(weak: &Weak<Inner>, epoch: u64) {
        let Some(inner) = weak.upgrade() else { return };
        let mut state = inner.state.lock();
        if !state.phase_loop.complete(epoch) {
            return;
        }

        let Some(phase) = state.phase.as_mut() else { return };
        phase.is_on = !phase.is_on;
        let on = phase.is_on;
        inner.notify(&mut state, on);

        Inner::schedule_next(&inner, &mut state);
    }

    fn schedule_next(inner: &Arc<Inner>, state: &mut StrobeState) {
        let (Some(config), Some(phase)) = (state.config, state.phase) else {
            return;
        };

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(phase.base);
        let boundary = phase.base + next_boundary(&config, phase.is_on, elapsed);

        let weak = Arc::downgrade(inner);
        state
            .phase_loop
            .arm_at(boundary, move |epoch| Inner::on_boundary(&weak, epoch));
    }
}
