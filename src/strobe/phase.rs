//! Pure phase-grid arithmetic for the strobe.
//!
//! Every boundary is computed from the session anchor, never from the time the
//! previous toggle actually fired, so late timers cannot accumulate drift.

use crate::config::{Platform, PlatformConfig, StrobeSettings};
use std::time::Duration;
use tokio::time::Instant;

/// Frequency used when a request is missing or nonsensical
pub const DEFAULT_FREQUENCY_HZ: f64 = 6.0;

/// Per-platform frequency ceilings and warm-up delays
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformLimits {
    pub ios_max_hz: f64,
    pub android_max_hz: f64,
    pub primed_warmup: Duration,
    pub ios_warmup: Duration,
    pub android_warmup: Duration,
}

impl PlatformLimits {
    pub fn from_config(config: &PlatformConfig) -> Self {
        Self {
            ios_max_hz: config.ios_max_hz,
            android_max_hz: config.android_max_hz,
            primed_warmup: Duration::from_millis(config.primed_warmup_ms),
            ios_warmup: Duration::from_millis(config.ios_warmup_ms),
            android_warmup: Duration::from_millis(config.android_warmup_ms),
        }
    }

    pub fn max_hz(&self, platform: Platform) -> f64 {
        match platform {
            Platform::Ios => self.ios_max_hz,
            Platform::Android => self.android_max_hz,
        }
    }

    pub fn warmup(&self, platform: Platform, primed: bool) -> Duration {
        if primed {
            return self.primed_warmup;
        }
        match platform {
            Platform::Ios => self.ios_warmup,
            Platform::Android => self.android_warmup,
        }
    }
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self::from_config(&crate::config::SirenConfig::default().platform)
    }
}

/// Pulse shape: on-time is `max(min_on, period * duty_fraction)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseShape {
    pub min_on: Duration,
    pub duty_fraction: f64,
}

impl PulseShape {
    pub fn from_settings(settings: &StrobeSettings) -> Self {
        Self {
            min_on: Duration::from_millis(settings.min_on_ms),
            duty_fraction: settings.duty_fraction,
        }
    }
}

impl Default for PulseShape {
    fn default() -> Self {
        Self {
            min_on: Duration::from_millis(180),
            duty_fraction: 0.6,
        }
    }
}

/// Parameters of one strobe session, fixed at start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrobeConfig {
    pub frequency_hz: f64,
    pub period: Duration,
    pub on_duration: Duration,
    pub warmup: Duration,
}

impl StrobeConfig {
    pub fn derive(
        requested_hz: f64,
        primed: bool,
        platform: Platform,
        limits: &PlatformLimits,
        pulse: &PulseShape,
    ) -> Self {
        let requested = if requested_hz.is_finite() && requested_hz > 0.0 {
            requested_hz
        } else {
            DEFAULT_FREQUENCY_HZ
        };
        let frequency_hz = requested.min(limits.max_hz(platform));

        // Whole nanoseconds keep the grid exact for integral periods
        let period_ns = (1e9 / frequency_hz).round() as u64;
        let period = Duration::from_nanos(period_ns.max(1));
        let duty_ns = (period_ns as f64 * pulse.duty_fraction).round() as u64;
        let on_duration = pulse.min_on.max(Duration::from_nanos(duty_ns));

        Self {
            frequency_hz,
            period,
            on_duration,
            warmup: limits.warmup(platform, primed),
        }
    }

    pub fn period_ms(&self) -> f64 {
        self.period.as_secs_f64() * 1000.0
    }

    pub fn on_duration_ms(&self) -> f64 {
        self.on_duration.as_secs_f64() * 1000.0
    }
}

/// Torch state anchored to the session start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrobePhase {
    pub base: Instant,
    pub is_on: bool,
}

/// Index of the period `elapsed` falls in
pub fn period_index(config: &StrobeConfig, elapsed: Duration) -> u128 {
    elapsed.as_nanos() / config.period.as_nanos().max(1)
}

/// Offset from the anchor of the next toggle, given the current state and time.
///
/// On: end of the current on-window, or the next cycle's if that already passed.
/// Off: start of the next cycle.
pub fn next_boundary(config: &StrobeConfig, is_on: bool, elapsed: Duration) -> Duration {
    let period = config.period.as_nanos().max(1);
    let on = config.on_duration.as_nanos();
    let now = elapsed.as_nanos();
    let k = period_index(config, elapsed);

    let boundary = if is_on {
        let end = k * period + on;
        if end <= now {
            (k + 1) * period + on
        } else {
            end
        }
    } else {
        (k + 1) * period
    };

    Duration::from_nanos(u64::try_from(boundary).unwrap_or(u64::MAX))
}
