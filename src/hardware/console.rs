use super::{AlertChannel, CameraAccess, TorchDriver};
use crate::error::{Result, TorchError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Torch stand-in that logs every transition
#[derive(Debug, Default)]
pub struct ConsoleTorch {
    toggles: AtomicU64,
}

impl ConsoleTorch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_count(&self) -> u64 {
        self.toggles.load(Ordering::Relaxed)
    }
}

impl TorchDriver for ConsoleTorch {
    fn set_torch(&self, on: bool) -> std::result::Result<(), TorchError> {
        let count = self.toggles.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(toggle = count, "Torch {}", if on { "ON" } else { "off" });
        Ok(())
    }

    fn name(&self) -> &str {
        "console_torch"
    }
}

/// Camera that answers the permission prompt after a fixed delay
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    granted: bool,
    prompt_delay: Duration,
}

impl SimulatedCamera {
    pub fn new(granted: bool) -> Self {
        Self {
            granted,
            prompt_delay: Duration::ZERO,
        }
    }

    pub fn with_prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay = delay;
        self
    }
}

#[async_trait]
impl CameraAccess for SimulatedCamera {
    async fn request_permission(&self) -> Result<bool> {
        if !self.prompt_delay.is_zero() {
            tokio::time::sleep(self.prompt_delay).await;
        }
        info!(
            "Camera permission {}",
            if self.granted { "granted" } else { "denied" }
        );
        Ok(self.granted)
    }
}

/// Alert channel that logs instead of playing sound or vibrating
#[derive(Debug, Default)]
pub struct ConsoleAlerts;

#[async_trait]
impl AlertChannel for ConsoleAlerts {
    async fn start_looping_alert(&self) -> Result<()> {
        info!("Siren audio loop started");
        Ok(())
    }

    async fn stop_alert(&self) -> Result<()> {
        info!("Siren audio loop stopped");
        Ok(())
    }

    async fn start_vibration_pattern(&self, pattern: &[Duration]) -> Result<()> {
        info!("Vibration started with pattern {:?}", pattern);
        Ok(())
    }

    async fn stop_vibration(&self) -> Result<()> {
        info!("Vibration stopped");
        Ok(())
    }
}
