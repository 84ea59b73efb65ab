use crate::config::CoverConfig;
use crate::timer::TimerSlot;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Cover lifecycle within one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverPhase {
    Visible,
    FadingOut,
    Hidden,
}

/// What caused the fade to start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeTrigger {
    CameraReady,
    Failsafe,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverState {
    pub phase: CoverPhase,
    pub opacity: f64,
    pub visible: bool,
}

impl CoverState {
    fn hidden() -> Self {
        Self {
            phase: CoverPhase::Hidden,
            opacity: 0.0,
            visible: false,
        }
    }
}

type CoverObserver = Box<dyn Fn(CoverState) + Send + Sync>;

/// Hides the camera preview until readiness is confirmed, or until the
/// failsafe gives up waiting. Whichever fires first wins.
pub struct CoverGate {
    inner: Arc<CoverInner>,
}

struct CoverInner {
    machine: Mutex<CoverMachine>,
    failsafe: Duration,
    fade: Duration,
    observer: Option<CoverObserver>,
}

struct CoverMachine {
    state: CoverState,
    failsafe_timer: TimerSlot,
    fade_timer: TimerSlot,
    fade_started_at: Option<Instant>,
    trigger: Option<FadeTrigger>,
    fades_started: u64,
}

impl CoverGate {
    pub fn new(config: &CoverConfig) -> Self {
        Self::build(config, None)
    }

    /// Same as `new`, with a callback run on every state change (under the cover lock)
    pub fn with_observer<F>(config: &CoverConfig, observer: F) -> Self
    where
        F: Fn(CoverState) + Send + Sync + 'static,
    {
        Self::build(config, Some(Box::new(observer)))
    }

    fn build(config: &CoverConfig, observer: Option<CoverObserver>) -> Self {
        Self {
            inner: Arc::new(CoverInner {
                machine: Mutex::new(CoverMachine {
                    state: CoverState::hidden(),
                    failsafe_timer: TimerSlot::new("cover_failsafe"),
                    fade_timer: TimerSlot::new("cover_fade"),
                    fade_started_at: None,
                    trigger: None,
                    fades_started: 0,
                }),
                failsafe: config.failsafe(),
                fade: config.fade(),
                observer,
            }),
        }
    }

    /// Show the cover for a new session and arm the failsafe
    pub fn begin(&self) {
        let mut machine = self.inner.machine.lock();
        machine.fade_timer.clear();
        machine.fade_started_at = None;
        machine.trigger = None;
        machine.state = CoverState {
            phase: CoverPhase::Visible,
            opacity: 1.0,
            visible: true,
        };
        self.inner.emit(&machine);

        let weak = Arc::downgrade(&self.inner);
        machine
            .failsafe_timer
            .arm(self.inner.failsafe, move |epoch| CoverInner::on_failsafe(&weak, epoch));
        debug!("Cover shown, failsafe in {:?}", self.inner.failsafe);
    }

    /// Camera confirmed live; returns true if this started the fade
    pub fn on_ready(&self) -> bool {
        let mut machine = self.inner.machine.lock();
        CoverInner::start_fade(&self.inner, &mut machine, FadeTrigger::CameraReady)
    }

    /// Cancel both timers and hide the cover without animating
    pub fn teardown(&self) {
        let mut machine = self.inner.machine.lock();
        machine.failsafe_timer.clear();
        machine.fade_timer.clear();
        machine.fade_started_at = None;
        if machine.state.phase != CoverPhase::Hidden {
            machine.state = CoverState::hidden();
            self.inner.emit(&machine);
        }
    }

    pub fn state(&self) -> CoverState {
        self.inner.machine.lock().state
    }

    pub fn is_visible(&self) -> bool {
        self.state().visible
    }

    /// Opacity at this instant, interpolated while fading
    pub fn opacity(&self) -> f64 {
        let machine = self.inner.machine.lock();
        match (machine.state.phase, machine.fade_started_at) {
            (CoverPhase::FadingOut, Some(started)) => {
                fade_opacity(started.elapsed(), self.inner.fade)
            }
            _ => machine.state.opacity,
        }
    }

    pub fn trigger(&self) -> Option<FadeTrigger> {
        self.inner.machine.lock().trigger
    }

    pub fn fades_started(&self) -> u64 {
        self.inner.machine.lock().fades_started
    }
}

impl CoverInner {
    fn emit(&self, machine: &CoverMachine) {
        if let Some(observer) = &self.observer {
            observer(machine.state);
        }
    }

    fn on_failsafe(weak: &Weak<CoverInner>, epoch: u64) {
        let Some(inner) = weak.upgrade() else { return };
        let mut machine = inner.machine.lock();
        if !machine.failsafe_timer.complete(epoch) {
            return;
        }
        CoverInner::start_fade(&inner, &mut machine, FadeTrigger::Failsafe);
    }

    fn start_fade(inner: &Arc<CoverInner>, machine: &mut CoverMachine, trigger: FadeTrigger) -> bool {
        if machine.state.phase != CoverPhase::Visible {
            debug!("Ignoring {:?}: cover already {:?}", trigger, machine.state.phase);
            return false;
        }

        machine.failsafe_timer.clear();
        machine.state.phase = CoverPhase::FadingOut;
        machine.state.visible = false;
        machine.fade_started_at = Some(Instant::now());
        machine.trigger = Some(trigger);
        machine.fades_started += 1;
        inner.emit(machine);

        match trigger {
            FadeTrigger::CameraReady => debug!("Camera ready, fading cover"),
            FadeTrigger::Failsafe => info!("Camera readiness not confirmed, failsafe fading cover"),
        }

        let weak = Arc::downgrade(inner);
        machine
            .fade_timer
            .arm(inner.fade, move |epoch| CoverInner::on_fade_done(&weak, epoch));
        true
    }

    fn on_fade_done(weak: &Weak<CoverInner>, epoch: u64) {
        let Some(inner) = weak.upgrade() else { return };
        let mut machine = inner.machine.lock();
        if !machine.fade_timer.complete(epoch) {
            return;
        }
        machine.state = CoverState::hidden();
        machine.fade_started_at = None;
        inner.emit(&machine);
        debug!("Cover hidden");
    }
}

/// Linear fade from 1 to 0 over `fade`
pub fn fade_opacity(elapsed: Duration, fade: Duration) -> f64 {
    if fade.is_zero() || elapsed >= fade {
        return 0.0;
    }
    1.0 - elapsed.as_secs_f64() / fade.as_secs_f64()
}
