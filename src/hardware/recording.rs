use super::{AlertChannel, TorchDriver};
use crate::error::{Result, SirenError, TorchError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Torch that records every call with its (tokio) timestamp
#[derive(Debug, Default)]
pub struct RecordingTorch {
    calls: Mutex<Vec<(Instant, bool)>>,
    failing: AtomicBool,
}

impl RecordingTorch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail after recording them
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn calls(&self) -> Vec<(Instant, bool)> {
        self.calls.lock().clone()
    }

    pub fn states(&self) -> Vec<bool> {
        self.calls.lock().iter().map(|(_, on)| *on).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn last_state(&self) -> Option<bool> {
        self.calls.lock().last().map(|(_, on)| *on)
    }
}

impl TorchDriver for RecordingTorch {
    fn set_torch(&self, on: bool) -> std::result::Result<(), TorchError> {
        self.calls.lock().push((Instant::now(), on));
        if self.failing.load(Ordering::Relaxed) {
            return Err(TorchError::Io {
                details: "simulated driver fault".to_string(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording_torch"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertCall {
    StartAlert,
    StopAlert,
    StartVibration(Vec<Duration>),
    StopVibration,
}

/// Alert channel that records calls; can be told to fail or stall on start
#[derive(Debug, Default)]
pub struct RecordingAlerts {
    calls: Mutex<Vec<AlertCall>>,
    fail_start: AtomicBool,
    start_delay: Duration,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_start() -> Self {
        let alerts = Self::default();
        alerts.fail_start.store(true, Ordering::Relaxed);
        alerts
    }

    /// Audio start takes `delay` before it is recorded
    pub fn slow_start(delay: Duration) -> Self {
        Self {
            start_delay: delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<AlertCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AlertChannel for RecordingAlerts {
    async fn start_looping_alert(&self) -> Result<()> {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        self.calls.lock().push(AlertCall::StartAlert);
        if self.fail_start.load(Ordering::Relaxed) {
            return Err(SirenError::alert("audio session unavailable"));
        }
        Ok(())
    }

    async fn stop_alert(&self) -> Result<()> {
        self.calls.lock().push(AlertCall::StopAlert);
        Ok(())
    }

    async fn start_vibration_pattern(&self, pattern: &[Duration]) -> Result<()> {
        self.calls
            .lock()
            .push(AlertCall::StartVibration(pattern.to_vec()));
        Ok(())
    }

    async fn stop_vibration(&self) -> Result<()> {
        self.calls.lock().push(AlertCall::StopVibration);
        Ok(())
    }
}
