use crate::config::TriggerConfig;
use crate::events::{EventBus, SirenEvent, Subscription};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Outcome of an activation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Accepted,
    Suppressed,
}

/// Two flags derived from the last seen bus events: set on `opening`/`open`,
/// both cleared on `closed`
#[derive(Debug, Default)]
pub struct ActivationGate {
    is_opening: AtomicBool,
    is_active: AtomicBool,
}

impl ActivationGate {
    pub fn observe(&self, event: SirenEvent) {
        match event {
            SirenEvent::Opening => self.is_opening.store(true, Ordering::SeqCst),
            SirenEvent::Open => self.is_active.store(true, Ordering::SeqCst),
            SirenEvent::Closed => {
                self.is_opening.store(false, Ordering::SeqCst);
                self.is_active.store(false, Ordering::SeqCst);
            }
            SirenEvent::CameraReady => {}
        }
    }

    pub fn is_opening(&self) -> bool {
        self.is_opening.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    pub fn is_blocked(&self) -> bool {
        self.is_opening() || self.is_active()
    }
}

/// Detects the rapid multi-tap gesture that raises the alarm
pub struct TapTrigger {
    gate: Arc<ActivationGate>,
    taps: Mutex<VecDeque<Instant>>,
    taps_required: usize,
    window: Duration,
    accepted: AtomicU64,
    _subscription: Subscription,
}

impl TapTrigger {
    pub fn new(config: &TriggerConfig, event_bus: &EventBus) -> Self {
        let gate = Arc::new(ActivationGate::default());
        let listener_gate = Arc::clone(&gate);
        let subscription = event_bus.subscribe(move |event| listener_gate.observe(event));

        Self {
            gate,
            taps: Mutex::new(VecDeque::new()),
            taps_required: config.taps_required.max(1) as usize,
            window: config.window(),
            accepted: AtomicU64::new(0),
            _subscription: subscription,
        }
    }

    /// Ask to raise the alarm; refused while a session is opening or active
    pub fn request_activation(&self) -> Activation {
        if self.gate.is_blocked() {
            debug!(
                "Activation suppressed (opening: {}, active: {})",
                self.gate.is_opening(),
                self.gate.is_active()
            );
            return Activation::Suppressed;
        }

        let count = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        info!("Activation accepted (#{})", count);
        Activation::Accepted
    }

    /// Record a tap; returns the activation outcome once enough taps land in the window
    pub fn register_tap(&self, at: Instant) -> Option<Activation> {
        let mut taps = self.taps.lock();

        while let Some(first) = taps.front() {
            if at.saturating_duration_since(*first) > self.window {
                taps.pop_front();
            } else {
                break;
            }
        }
        taps.push_back(at);
        debug!("Tap {}/{}", taps.len(), self.taps_required);

        if taps.len() < self.taps_required {
            return None;
        }

        taps.clear();
        drop(taps);
        Some(self.request_activation())
    }

    /// Taps currently counted toward the gesture
    pub fn pending_taps(&self) -> usize {
        self.taps.lock().len()
    }

    pub fn gate(&self) -> &ActivationGate {
        &self.gate
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}
