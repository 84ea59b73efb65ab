//! Collaborators the siren session drives but does not own the timing of.

mod console;
mod recording;

pub use console::{ConsoleAlerts, ConsoleTorch, SimulatedCamera};
pub use recording::{AlertCall, RecordingAlerts, RecordingTorch};

use crate::error::{Result, TorchError};
use async_trait::async_trait;
use std::time::Duration;

/// Sets the physical torch (camera flash LED) state
pub trait TorchDriver: Send + Sync {
    fn set_torch(&self, on: bool) -> std::result::Result<(), TorchError>;

    fn name(&self) -> &str {
        "torch"
    }
}

/// Camera permission handshake; readiness and mount failures are pushed
/// into the session separately since they arrive as platform callbacks
#[async_trait]
pub trait CameraAccess: Send + Sync {
    async fn request_permission(&self) -> Result<bool>;
}

/// Audio loop and vibration, started and stopped at session boundaries
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn start_looping_alert(&self) -> Result<()>;

    async fn stop_alert(&self) -> Result<()>;

    async fn start_vibration_pattern(&self, pattern: &[Duration]) -> Result<()>;

    async fn stop_vibration(&self) -> Result<()>;
}
